//! Wavefront OBJ support.
//!
//! Reads `v`, `vt` and `f` records; everything else (normals, groups,
//! materials) is ignored. Polygons are fan-triangulated. Indices are 1-based
//! on disk and may be negative (relative to the end of the list so far).
//!
//! UVs are kept when every referenced vertex ends up with exactly one texture
//! coordinate. Files written by [`save`] always satisfy this: each `vt` line
//! pairs with the `v` line of the same index.

use std::fs;
use std::io::Write;
use std::path::Path;

use nalgebra::{Point2, Point3};
use tracing::{debug, warn};

use super::write_atomic;
use crate::error::{MeshError, Result};
use crate::mesh::Mesh;

/// Load a mesh from an OBJ file.
///
/// # Example
///
/// ```no_run
/// use unfold::io::obj;
///
/// let mesh = obj::load("model.obj").unwrap();
/// println!("{} triangles", mesh.num_triangles());
/// ```
///
/// # Errors
///
/// - [`MeshError::Io`] if the file cannot be read
/// - [`MeshError::LoadError`] for unparsable records or dangling indices
/// - Any mesh validation error from [`Mesh::new`]
pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse(&content).map_err(|message| MeshError::LoadError {
        path: path.to_path_buf(),
        message,
    })?
}

/// Parse OBJ text.
///
/// The outer error is a syntax problem (reported with its line number), the
/// inner one a validation failure of the resulting mesh.
fn parse(content: &str) -> std::result::Result<Result<Mesh>, String> {
    let mut positions: Vec<Point3<f64>> = Vec::new();
    let mut tex_coords: Vec<Point2<f64>> = Vec::new();
    // (position, texture coordinate) per triangle corner
    let mut corners: Vec<[(usize, Option<usize>); 3]> = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };
        let fields: Vec<&str> = parts.collect();
        let at = |msg: String| format!("line {}: {}", line_no + 1, msg);

        match keyword {
            "v" => {
                let [x, y, z] = parse_floats::<3>(&fields).map_err(at)?;
                positions.push(Point3::new(x, y, z));
            }
            "vt" => {
                let [u, v] = parse_floats::<2>(&fields).map_err(at)?;
                tex_coords.push(Point2::new(u, v));
            }
            "f" => {
                if fields.len() < 3 {
                    return Err(at(format!("face has {} vertices", fields.len())));
                }
                let face = fields
                    .iter()
                    .map(|f| parse_corner(f, positions.len(), tex_coords.len()))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(at)?;
                for i in 1..face.len() - 1 {
                    corners.push([face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
    }

    let triangles: Vec<[usize; 3]> = corners.iter().map(|c| c.map(|(p, _)| p)).collect();
    let uvs = resolve_uvs(positions.len(), &tex_coords, &corners);

    debug!(
        vertices = positions.len(),
        triangles = triangles.len(),
        has_uvs = uvs.is_some(),
        "parsed OBJ"
    );

    let mesh = Mesh::new(positions, triangles);
    Ok(match (mesh, uvs) {
        (Ok(mesh), Some(uvs)) => mesh.with_uvs(uvs),
        (mesh, _) => mesh,
    })
}

fn parse_floats<const N: usize>(fields: &[&str]) -> std::result::Result<[f64; N], String> {
    if fields.len() < N {
        return Err(format!("expected {} coordinates, found {}", N, fields.len()));
    }
    let mut out = [0.0; N];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field
            .parse()
            .map_err(|_| format!("invalid number '{}'", field))?;
    }
    Ok(out)
}

/// Parse one face corner: `v`, `v/vt`, `v/vt/vn` or `v//vn`.
fn parse_corner(
    field: &str,
    num_positions: usize,
    num_tex_coords: usize,
) -> std::result::Result<(usize, Option<usize>), String> {
    let mut parts = field.split('/');
    let position = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing vertex index in '{}'", field))?;
    let position = resolve_index(position, num_positions)?;

    let tex_coord = match parts.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, num_tex_coords)?),
        _ => None,
    };

    Ok((position, tex_coord))
}

/// Convert a 1-based (or negative, relative) OBJ index to 0-based.
fn resolve_index(s: &str, len: usize) -> std::result::Result<usize, String> {
    let raw: i64 = s
        .parse()
        .map_err(|_| format!("invalid index '{}'", s))?;
    let resolved = match raw {
        0 => None,
        r if r > 0 => Some(r as usize - 1),
        r => len.checked_sub(r.unsigned_abs() as usize),
    };
    match resolved {
        Some(i) if i < len => Ok(i),
        _ => Err(format!("index {} out of range (have {})", raw, len)),
    }
}

/// Per-vertex UVs, when the file defines them consistently.
fn resolve_uvs(
    num_positions: usize,
    tex_coords: &[Point2<f64>],
    corners: &[[(usize, Option<usize>); 3]],
) -> Option<Vec<Point2<f64>>> {
    if tex_coords.is_empty() {
        return None;
    }

    let mut uvs: Vec<Option<usize>> = vec![None; num_positions];
    for &(p, t) in corners.iter().flatten() {
        // Corners without an explicit vt pair with the vt of the same index.
        let t = match t {
            Some(t) => t,
            None if tex_coords.len() == num_positions => p,
            None => {
                warn!(vertex = p, "face corner without texture coordinate, dropping UVs");
                return None;
            }
        };
        match uvs[p] {
            None => uvs[p] = Some(t),
            Some(existing) if tex_coords[existing] == tex_coords[t] => {}
            Some(_) => {
                warn!(vertex = p, "vertex has several texture coordinates, dropping UVs");
                return None;
            }
        }
    }

    // Vertices no triangle references still need a slot.
    uvs.into_iter()
        .enumerate()
        .map(|(p, t)| match t {
            Some(t) => Some(tex_coords[t]),
            None if tex_coords.len() == num_positions => Some(tex_coords[p]),
            None => Some(Point2::origin()),
        })
        .collect()
}

/// Save a mesh as OBJ.
///
/// When the mesh has UVs, one `vt` line is written per vertex and faces use
/// the `v/vt` form. The file is written to a temporary sibling first and
/// renamed into place.
///
/// # Example
///
/// ```no_run
/// use unfold::{fixtures, io::obj};
///
/// obj::save(&fixtures::cube(), "cube.obj").unwrap();
/// ```
pub fn save<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, |w| write(mesh, w)).map_err(|e| match e {
        MeshError::Io(io) => MeshError::SaveError {
            path: path.to_path_buf(),
            message: io.to_string(),
        },
        other => other,
    })
}

/// Write OBJ text.
pub fn write<W: Write>(mesh: &Mesh, w: &mut W) -> Result<()> {
    writeln!(w, "# unfold")?;
    writeln!(
        w,
        "# {} vertices, {} triangles",
        mesh.num_vertices(),
        mesh.num_triangles()
    )?;

    for p in mesh.positions() {
        writeln!(w, "v {} {} {}", p.x, p.y, p.z)?;
    }

    let has_uvs = match mesh.uvs() {
        Some(uvs) => {
            for uv in uvs {
                writeln!(w, "vt {} {}", uv.x, uv.y)?;
            }
            true
        }
        None => false,
    };

    for t in mesh.triangles() {
        let [a, b, c] = t.map(|i| i + 1);
        if has_uvs {
            writeln!(w, "f {a}/{a} {b}/{b} {c}/{c}")?;
        } else {
            writeln!(w, "f {a} {b} {c}")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn parse_ok(text: &str) -> Mesh {
        parse(text).unwrap().unwrap()
    }

    #[test]
    fn test_parse_triangle() {
        let mesh = parse_ok("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.triangles(), &[[0, 1, 2]]);
        assert!(!mesh.has_uvs());
    }

    #[test]
    fn test_parse_quad_and_comments() {
        let text = "# square\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\n\nf 1//1 2//1 3//1 4//1\n";
        let mesh = parse_ok(text);
        assert_eq!(mesh.triangles(), &[[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_negative_indices() {
        let mesh = parse_ok("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n");
        assert_eq!(mesh.triangles(), &[[0, 1, 2]]);
    }

    #[test]
    fn test_explicit_tex_coords() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0.5 0.5\nvt 0.25 0\nvt 0 0.75\nf 1/2 2/3 3/1\n";
        let mesh = parse_ok(text);
        let uvs = mesh.uvs().unwrap();
        assert_eq!(uvs[0], Point2::new(0.25, 0.0));
        assert_eq!(uvs[1], Point2::new(0.0, 0.75));
        assert_eq!(uvs[2], Point2::new(0.5, 0.5));
    }

    #[test]
    fn test_conflicting_tex_coords_dropped() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nvt 1 1\nvt 0.5 0.5\n\
                    f 1/1 2/2 3/3\nf 2/5 4/4 3/3\n";
        let mesh = parse_ok(text);
        assert!(!mesh.has_uvs());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("v 0 0\n").is_err());
        assert!(parse("v 0 0 zero\n").is_err());
        assert!(parse("v 0 0 0\nv 1 0 0\nf 1 2\n").is_err());
        let err = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n").unwrap_err();
        assert!(err.starts_with("line 4"), "{}", err);
    }

    #[test]
    fn test_validation_errors_pass_through() {
        let inner = parse("v 0 0 0\nv 1 0 0\nv 2 0 0\nf 1 2 3\n").unwrap();
        assert!(matches!(inner, Err(MeshError::ZeroAreaFace { .. })));
        let inner = parse("# nothing\n").unwrap();
        assert!(matches!(inner, Err(MeshError::EmptyMesh)));
    }

    #[test]
    fn test_write_then_parse() {
        let square = fixtures::unit_square()
            .with_uvs(vec![
                Point2::new(0.0, 0.0),
                Point2::new(0.5, 0.0),
                Point2::new(0.5, 1.0 / 3.0),
                Point2::new(0.0, 1.0 / 3.0),
            ])
            .unwrap();

        let mut buf = Vec::new();
        write(&square, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("f 1/1 2/2 3/3"));

        assert_eq!(parse_ok(&text), square);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.obj");
        let cube = fixtures::cube();
        save(&cube, &path).unwrap();
        assert_eq!(load(&path).unwrap(), cube);
        // Only the final file remains.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("missing.obj")).unwrap_err();
        assert!(matches!(err, MeshError::Io(_)));
    }
}
