//! Message Interchange Protocol version negotiation (§4.K): picks the
//! greatest version common to every participating component class;
//! construction fails with `no_match` when the intersection is empty.

use crate::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no common MIP version across {0} component classes")]
    NoMatch(usize),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NoMatch
    }
}

/// Given each component class's list of supported MIP versions, returns
/// the greatest version present in every list.
pub fn negotiate(supported_by_class: &[Vec<u32>]) -> Result<u32, Error> {
    if supported_by_class.is_empty() {
        return Err(Error::NoMatch(0));
    }
    let mut intersection: std::collections::HashSet<u32> = supported_by_class[0].iter().copied().collect();
    for supported in &supported_by_class[1..] {
        let this: std::collections::HashSet<u32> = supported.iter().copied().collect();
        intersection = intersection.intersection(&this).copied().collect();
    }
    intersection
        .into_iter()
        .max()
        .ok_or(Error::NoMatch(supported_by_class.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_greatest_common_version() {
        let v = negotiate(&[vec![0, 1], vec![1, 2]]).unwrap();
        assert_eq!(v, 1);
    }

    #[test]
    fn empty_intersection_is_no_match() {
        assert!(matches!(negotiate(&[vec![0], vec![1]]), Err(Error::NoMatch(_))));
    }

    #[test]
    fn no_classes_is_no_match() {
        assert!(matches!(negotiate(&[]), Err(Error::NoMatch(_))));
    }
}
