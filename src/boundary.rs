// boundary.rs -- Repeat-edge boundary accessor.
//
// Wraps a source buffer in a function node that clamps every
// coordinate axis independently into [0, dim-1], so any out-of-range
// access resolves to the nearest edge element. This is the only
// boundary policy in scope; every pipeline reads its image input
// through it, and raw in-range reads are used only for kernel masks.

use crate::expr::{x, y};
use crate::graph::{ConstructionError, FuncId, Graph, SourceId};

/// Wrap `src` with repeat-edge addressing. The returned node has the
/// source's rank and clamps each axis to its extent.
pub fn repeat_edge(g: &mut Graph, src: SourceId) -> Result<FuncId, ConstructionError> {
    let decl = g.source(src);
    let name = format!("{}_edged", decl.name);
    let shape = decl.shape.clone();
    match shape.as_slice() {
        [n] => {
            let read = src.read([x().clamp(0, (*n as i32) - 1)]);
            g.define(&name, 1, read)
        }
        [w, h] => {
            let read = src.read([
                x().clamp(0, (*w as i32) - 1),
                y().clamp(0, (*h as i32) - 1),
            ]);
            g.define(&name, 2, read)
        }
        other => Err(ConstructionError::UnsupportedArity {
            node: name,
            arity: other.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::value::DType;

    #[test]
    fn test_repeat_edge_arity_follows_source() {
        let mut g = Graph::new();
        let s2 = g.add_source("img", DType::F32, &[4, 3]);
        let s1 = g.add_source("row", DType::I32, &[16]);
        let f2 = repeat_edge(&mut g, s2).unwrap();
        let f1 = repeat_edge(&mut g, s1).unwrap();
        assert_eq!(g.func(f2).arity, 2);
        assert_eq!(g.func(f1).arity, 1);
        assert_eq!(g.func(f2).name, "img_edged");
    }
}
