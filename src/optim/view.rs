//! Read-through view over an optimizer's parameters

use super::ParamGroup;
use crate::Tensor;
use std::slice;

/// Lazy iterator over every parameter of every group, in registration order
///
/// Nothing is copied and nothing is deduplicated: a tensor registered in two
/// groups is yielded twice.
#[derive(Debug, Clone)]
pub struct ParamView<'a> {
    groups: slice::Iter<'a, ParamGroup>,
    current: slice::Iter<'a, Tensor>,
}

impl<'a> ParamView<'a> {
    /// View over the given groups
    pub fn new(groups: &'a [ParamGroup]) -> Self {
        Self {
            groups: groups.iter(),
            current: Default::default(),
        }
    }
}

impl<'a> Iterator for ParamView<'a> {
    type Item = &'a Tensor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(param) = self.current.next() {
                return Some(param);
            }
            self.current = self.groups.next()?.params().iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining_here = self.current.len();
        let rest: usize = self.groups.clone().map(ParamGroup::len).sum();
        let total = remaining_here + rest;
        (total, Some(total))
    }
}

impl ExactSizeIterator for ParamView<'_> {}

impl std::iter::FusedIterator for ParamView<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn group(values: &[f32]) -> ParamGroup {
        ParamGroup::new(values.iter().map(|&v| Tensor::from_vec(vec![v], true)).collect())
    }

    #[test]
    fn test_view_flattens_groups_in_order() {
        let groups = vec![group(&[1.0, 2.0, 3.0]), group(&[]), group(&[4.0, 5.0])];
        let values: Vec<f32> = ParamView::new(&groups).map(Tensor::item).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ParamView::new(&groups).len(), 5);
    }

    #[test]
    fn test_view_yields_shared_handles() {
        let groups = vec![group(&[1.0])];
        let first = ParamView::new(&groups).next().unwrap();
        assert!(first.shares_storage(&groups[0].params()[0]));
    }

    #[test]
    fn test_view_does_not_deduplicate() {
        let shared = Tensor::from_vec(vec![1.0], true);
        let groups = vec![
            ParamGroup::new(vec![shared.clone()]),
            ParamGroup::new(vec![shared.clone()]),
        ];
        let view: Vec<&Tensor> = ParamView::new(&groups).collect();
        assert_eq!(view.len(), 2);
        assert!(view[0].shares_storage(view[1]));
    }

    #[test]
    fn test_empty_view() {
        let groups: Vec<ParamGroup> = Vec::new();
        assert_eq!(ParamView::new(&groups).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_view_is_concatenation_of_groups(sizes in prop::collection::vec(0usize..6, 0..6)) {
            let mut next = 0.0f32;
            let groups: Vec<ParamGroup> = sizes
                .iter()
                .map(|&n| {
                    let values: Vec<f32> = (0..n).map(|_| { next += 1.0; next }).collect();
                    group(&values)
                })
                .collect();

            let expected: Vec<f32> = groups
                .iter()
                .flat_map(|g| g.params().iter().map(Tensor::item))
                .collect();
            let viewed: Vec<f32> = ParamView::new(&groups).map(Tensor::item).collect();

            prop_assert_eq!(ParamView::new(&groups).len(), expected.len());
            prop_assert_eq!(viewed, expected);
        }
    }
}
