use std::collections::HashSet;

use crate::types::PathSegment;

/// Literal path-segment include/exclude matcher.
///
/// Exclusion wins over inclusion. An empty include set admits everything.
#[derive(Clone, Debug, Default)]
pub struct SegmentFilter {
    include: HashSet<PathSegment>,
    exclude: HashSet<PathSegment>,
}

impl SegmentFilter {
    /// Filter from include and exclude segment lists; an empty include admits all.
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathSegment>,
        E: IntoIterator,
        E::Item: Into<PathSegment>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// True if any segment is excluded.
    pub fn excludes<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        !self.exclude.is_empty()
            && segments
                .iter()
                .any(|segment| self.exclude.contains(segment.as_ref()))
    }

    /// True if the include set is empty or any segment is included.
    pub fn includes<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        self.include.is_empty()
            || segments
                .iter()
                .any(|segment| self.include.contains(segment.as_ref()))
    }

    /// Whether a file with these segments participates.
    pub fn admits<S: AsRef<str>>(&self, segments: &[S]) -> bool {
        !self.excludes(segments) && self.includes(segments)
    }

    /// Whether descent into a directory with these segments should stop.
    ///
    /// Only exclusion prunes: an include match may still appear deeper.
    pub fn prunes<S: AsRef<str>>(&self, dir_segments: &[S]) -> bool {
        self.excludes(dir_segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_admits_everything() {
        let filter = SegmentFilter::default();
        assert!(filter.admits(&["x", "SITE1", "P001", "steps", "a.csv.gz"]));
        assert!(!filter.prunes(&["x", "SITE1"]));
    }

    #[test]
    fn include_requires_one_matching_segment() {
        let filter = SegmentFilter::new(["steps"], Vec::<String>::new());
        assert!(filter.admits(&["x", "SITE1", "P001", "steps", "a.csv.gz"]));
        assert!(!filter.admits(&["x", "SITE1", "P001", "heart_rate", "a.csv.gz"]));
    }

    #[test]
    fn exclusion_takes_precedence() {
        let filter = SegmentFilter::new(["P001", "SITE1"], ["P001"]);
        assert!(!filter.admits(&["x", "SITE1", "P001", "steps", "a.csv.gz"]));
        assert!(filter.admits(&["x", "SITE1", "P002", "steps", "a.csv.gz"]));
        assert!(filter.prunes(&["x", "SITE1", "P001"]));
        assert!(!filter.prunes(&["x", "SITE1"]));
    }

    #[test]
    fn matching_is_literal_not_substring() {
        let filter = SegmentFilter::new(Vec::<String>::new(), ["P00"]);
        assert!(filter.admits(&["x", "SITE1", "P001", "steps", "a.csv.gz"]));
    }
}
