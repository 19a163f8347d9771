//! Row-key layout for edge rows.
//!
//! An edge row key is `source || EDGE_DELIM_1 || label || EDGE_DELIM_2 || dest`.
//! Nothing is escaped: vertex ids and labels must not contain either
//! delimiter. Under that precondition every outgoing edge of `v` lives in the
//! half-open range `[v || EDGE_DELIM_1, v || ADJACENCY_SENTINEL)`.

use crate::types::{EdgeKey, GraphError, Result, VertexId};

/// Separates the source vertex id from the label.
pub const EDGE_DELIM_1: &[u8] = b"|";
/// Separates the label from the destination vertex id.
pub const EDGE_DELIM_2: &[u8] = b"|";
/// Exclusive upper bound byte for adjacency scans.
///
/// This is the byte immediately after `EDGE_DELIM_1`, so the adjacency range
/// of `v` holds exactly the keys prefixed by `v || EDGE_DELIM_1` and never
/// the edges of a vertex whose id merely starts with `v`.
pub const ADJACENCY_SENTINEL: u8 = b'}';

/// Builds the edge row key `source || "|" || label || "|" || dest`.
///
/// The bytes of both ids are copied verbatim. Ids or labels that contain a
/// delimiter produce a key that does not decode back to the same parts.
pub fn encode_edge_key(source: &VertexId, label: &str, dest: &VertexId) -> Vec<u8> {
    let src = source.as_bytes();
    let dst = dest.as_bytes();
    let len = src.len() + EDGE_DELIM_1.len() + label.len() + EDGE_DELIM_2.len() + dst.len();
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(src);
    buf.extend_from_slice(EDGE_DELIM_1);
    buf.extend_from_slice(label.as_bytes());
    buf.extend_from_slice(EDGE_DELIM_2);
    buf.extend_from_slice(dst);
    buf
}

/// Splits an edge row key back into its components.
///
/// Locates the first `EDGE_DELIM_1`, then the first `EDGE_DELIM_2` after it.
/// Either delimiter missing yields [`GraphError::MalformedKey`].
pub fn decode_edge_key(bytes: &[u8]) -> Result<EdgeKey> {
    let first = find(bytes, EDGE_DELIM_1, 0)
        .ok_or_else(|| malformed(bytes, "missing source delimiter"))?;
    let label_start = first + EDGE_DELIM_1.len();
    let second = find(bytes, EDGE_DELIM_2, label_start)
        .ok_or_else(|| malformed(bytes, "missing destination delimiter"))?;
    let dest_start = second + EDGE_DELIM_2.len();
    if first == 0 {
        return Err(malformed(bytes, "empty source id"));
    }
    if dest_start == bytes.len() {
        return Err(malformed(bytes, "empty destination id"));
    }
    let label = std::str::from_utf8(&bytes[label_start..second])
        .map_err(|_| malformed(bytes, "label is not utf8"))?;
    Ok(EdgeKey {
        source: VertexId::from_bytes(&bytes[..first]),
        label: label.to_owned(),
        dest: VertexId::from_bytes(&bytes[dest_start..]),
    })
}

/// Extracts only the destination id from an edge row key.
pub fn decode_edge_dest(bytes: &[u8]) -> Result<VertexId> {
    decode_edge_key(bytes).map(|key| key.dest)
}

/// Returns `(start_inclusive, stop_exclusive)` covering the out-edges of `vertex`.
pub fn adjacency_bounds(vertex: &VertexId) -> (Vec<u8>, Vec<u8>) {
    let id = vertex.as_bytes();
    let mut lower = Vec::with_capacity(id.len() + EDGE_DELIM_1.len());
    lower.extend_from_slice(id);
    lower.extend_from_slice(EDGE_DELIM_1);

    let mut upper = Vec::with_capacity(id.len() + 1);
    upper.extend_from_slice(id);
    upper.push(ADJACENCY_SENTINEL);
    (lower, upper)
}

/// Rejects ids and labels that would make edge keys ambiguous.
///
/// The codec itself never calls this; writers that accept external input do.
pub fn validate_component(what: &str, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(GraphError::Invalid(format!("{what} must not be empty")));
    }
    if find(bytes, EDGE_DELIM_1, 0).is_some() || find(bytes, EDGE_DELIM_2, 0).is_some() {
        return Err(GraphError::Invalid(format!(
            "{what} '{}' contains a reserved edge delimiter",
            String::from_utf8_lossy(bytes)
        )));
    }
    Ok(())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn malformed(bytes: &[u8], reason: &str) -> GraphError {
    GraphError::MalformedKey(format!("{reason}: '{}'", String::from_utf8_lossy(bytes)))
}
