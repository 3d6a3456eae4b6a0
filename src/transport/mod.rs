/// Filesystem traversal in per-directory units.
pub mod fs;
/// Gzip CSV table reading.
pub mod table;
