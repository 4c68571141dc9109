//! Geometric type parsing.
//!
//! Text forms: point `(x,y)`, line `{A,B,C}`, lseg `[(x1,y1),(x2,y2)]`,
//! box `(x1,y1),(x2,y2)`, path `((x,y),...)` closed or `[(x,y),...]` open,
//! polygon `((x,y),...)`, circle `<(x,y),r>`, tid `(block,offset)`.

use crate::error::{Error, Result};

/// A point on a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// An infinite line `Ax + By + C = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// A finite line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub a: Point,
    pub b: Point,
}

/// A rectangular box given by two opposite corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgBox {
    pub a: Point,
    pub b: Point,
}

/// An open or closed path of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub points: Vec<Point>,
    pub open: bool,
}

/// A closed polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

/// A circle given by center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

/// A tuple physical location: block number and offset within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tid {
    pub block: u64,
    pub offset: u64,
}

pub(crate) fn decode_point(text: &str) -> Result<Point> {
    let inner = strip_wrapped(text, '(', ')', "point")?;
    parse_point_inner(inner, text)
}

pub(crate) fn decode_line(text: &str) -> Result<Line> {
    let inner = strip_wrapped(text, '{', '}', "line")?;
    let mut parts = inner.splitn(3, ',');
    let a = parse_f64(parts.next(), text, "line")?;
    let b = parse_f64(parts.next(), text, "line")?;
    let c = parse_f64(parts.next(), text, "line")?;
    Ok(Line { a, b, c })
}

pub(crate) fn decode_lseg(text: &str) -> Result<LineSegment> {
    let inner = strip_wrapped(text, '[', ']', "lseg")?;
    let points = parse_point_list(inner, text, "lseg")?;
    match points.as_slice() {
        [a, b] => Ok(LineSegment { a: *a, b: *b }),
        _ => Err(invalid("lseg", text)),
    }
}

pub(crate) fn decode_box(text: &str) -> Result<PgBox> {
    let points = parse_point_list(text, text, "box")?;
    match points.as_slice() {
        [a, b] => Ok(PgBox { a: *a, b: *b }),
        _ => Err(invalid("box", text)),
    }
}

pub(crate) fn decode_path(text: &str) -> Result<Path> {
    let (inner, open) = if text.starts_with('[') {
        (strip_wrapped(text, '[', ']', "path")?, true)
    } else {
        (strip_wrapped(text, '(', ')', "path")?, false)
    };
    let points = parse_point_list(inner, text, "path")?;
    Ok(Path { points, open })
}

pub(crate) fn decode_polygon(text: &str) -> Result<Polygon> {
    let inner = strip_wrapped(text, '(', ')', "polygon")?;
    let points = parse_point_list(inner, text, "polygon")?;
    Ok(Polygon { points })
}

pub(crate) fn decode_circle(text: &str) -> Result<Circle> {
    let inner = strip_wrapped(text, '<', '>', "circle")?;
    let point_part = inner.strip_prefix('(').ok_or_else(|| invalid("circle", text))?;
    let (point_inner, rest) = point_part
        .split_once(')')
        .ok_or_else(|| invalid("circle", text))?;
    let radius_part = rest.strip_prefix(',').ok_or_else(|| invalid("circle", text))?;

    Ok(Circle {
        center: parse_point_inner(point_inner, text)?,
        radius: parse_f64(Some(radius_part), text, "circle")?,
    })
}

pub(crate) fn decode_tid(text: &str) -> Result<Tid> {
    let inner = strip_wrapped(text, '(', ')', "tid")?;
    let (block, offset) = inner.split_once(',').ok_or_else(|| invalid("tid", text))?;
    let block = block.parse().map_err(|_| invalid("tid", text))?;
    let offset = offset.parse().map_err(|_| invalid("tid", text))?;
    Ok(Tid { block, offset })
}

fn parse_point_inner(inner: &str, whole: &str) -> Result<Point> {
    let (x, y) = inner.split_once(',').ok_or_else(|| invalid("point", whole))?;
    Ok(Point {
        x: parse_f64(Some(x), whole, "point")?,
        y: parse_f64(Some(y), whole, "point")?,
    })
}

/// Parse a `(x,y),(x,y),...` sequence.
fn parse_point_list(text: &str, whole: &str, what: &str) -> Result<Vec<Point>> {
    let mut points = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let body = rest.strip_prefix('(').ok_or_else(|| invalid(what, whole))?;
        let (inner, after) = body.split_once(')').ok_or_else(|| invalid(what, whole))?;
        points.push(parse_point_inner(inner, whole)?);

        rest = match after.strip_prefix(',') {
            Some(more) => more,
            None if after.is_empty() => after,
            None => return Err(invalid(what, whole)),
        };
    }
    if points.is_empty() {
        return Err(invalid(what, whole));
    }
    Ok(points)
}

fn strip_wrapped<'a>(text: &'a str, open: char, close: char, what: &str) -> Result<&'a str> {
    text.strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
        .ok_or_else(|| invalid(what, text))
}

fn parse_f64(part: Option<&str>, whole: &str, what: &str) -> Result<f64> {
    part.and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| invalid(what, whole))
}

fn invalid(what: &str, text: &str) -> Error {
    Error::Decode(format!("Invalid {what}: \"{text}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_point() {
        assert_eq!(
            decode_point("(1.5,-2)").unwrap(),
            Point { x: 1.5, y: -2.0 }
        );
        assert!(decode_point("1,2").is_err());
        assert!(decode_point("(a,2)").is_err());
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(
            decode_line("{1,-1,0}").unwrap(),
            Line {
                a: 1.0,
                b: -1.0,
                c: 0.0
            }
        );
    }

    #[test]
    fn test_decode_lseg() {
        assert_eq!(
            decode_lseg("[(0,0),(2,2)]").unwrap(),
            LineSegment {
                a: Point { x: 0.0, y: 0.0 },
                b: Point { x: 2.0, y: 2.0 },
            }
        );
    }

    #[test]
    fn test_decode_box() {
        assert_eq!(
            decode_box("(2,2),(0,0)").unwrap(),
            PgBox {
                a: Point { x: 2.0, y: 2.0 },
                b: Point { x: 0.0, y: 0.0 },
            }
        );
        assert!(decode_box("(2,2)").is_err());
    }

    #[test]
    fn test_decode_path_open_and_closed() {
        let open = decode_path("[(0,0),(1,1),(2,0)]").unwrap();
        assert!(open.open);
        assert_eq!(open.points.len(), 3);

        let closed = decode_path("((0,0),(1,1))").unwrap();
        assert!(!closed.open);
        assert_eq!(closed.points.len(), 2);
    }

    #[test]
    fn test_decode_polygon() {
        let polygon = decode_polygon("((0,0),(0,1),(1,1))").unwrap();
        assert_eq!(
            polygon.points,
            vec![
                Point { x: 0.0, y: 0.0 },
                Point { x: 0.0, y: 1.0 },
                Point { x: 1.0, y: 1.0 },
            ]
        );
    }

    #[test]
    fn test_decode_circle() {
        assert_eq!(
            decode_circle("<(1,2),3>").unwrap(),
            Circle {
                center: Point { x: 1.0, y: 2.0 },
                radius: 3.0
            }
        );
    }

    #[test]
    fn test_decode_tid() {
        assert_eq!(
            decode_tid("(42,7)").unwrap(),
            Tid {
                block: 42,
                offset: 7
            }
        );
    }
}
