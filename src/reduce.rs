// reduce.rs -- whole-buffer reductions to a scalar output.

use crate::expr::{acc, lit, rx};
use crate::graph::{ConstructionError, FuncId, Graph, ReductionDomain, SourceId};

/// Sum every element of a 1-D integer source into a scalar function
/// node (arity 0).
pub fn sum_all(g: &mut Graph, name: &str, src: SourceId) -> Result<FuncId, ConstructionError> {
    let shape = g.source(src).shape.clone();
    let domain = ReductionDomain::of_extents(&shape);
    g.define_reduce(name, 0, lit(0i32), acc() + src.read([rx()]), domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufMut, Buffer};
    use crate::interp::HostBackend;
    use crate::pipeline::{Bindings, Pipeline};
    use crate::value::DType;

    fn run(data: Vec<i32>) -> i32 {
        let mut g = Graph::new();
        let src = g.add_source("v", DType::I32, &[data.len()]);
        let out = sum_all(&mut g, "total", src).unwrap();
        let input = Buffer::<i32>::from_vec(&[data.len()], data);
        let mut bindings = Bindings::new();
        bindings.bind(src, &input);

        let mut pipe = Pipeline::new(g, vec![out]);
        let mut buf = Buffer::<i32>::new(&[]);
        pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut buf)])
            .unwrap();
        buf.as_slice()[0]
    }

    #[test]
    fn sums_one_to_a_hundred() {
        assert_eq!(run((1..=100).collect()), 5050);
    }

    #[test]
    fn empty_input_sums_to_the_init_value() {
        assert_eq!(run(Vec::new()), 0);
    }

    #[test]
    fn wraps_on_overflow() {
        assert_eq!(run(vec![i32::MAX, 1]), i32::MIN);
    }
}
