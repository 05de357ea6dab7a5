// ABOUTME: Staleness filter - decides per table pair whether rows must be compared
// ABOUTME: Uses engine update times and the watermark of the last successful run

use crate::table::TableDescriptor;

/// Whether a matched table pair needs replication work.
///
/// Equal update times mean the engine sees both sides as identical, regardless of
/// the watermark. Otherwise the pair is stale if either side changed after the
/// last successful sync.
pub fn needs_sync(left: &TableDescriptor, right: &TableDescriptor, watermark: i64) -> bool {
    updated_since(left.updated_at(), right.updated_at(), watermark)
}

/// [`needs_sync`] on raw update times. A missing time never counts as a change.
pub fn updated_since(left: Option<i64>, right: Option<i64>, watermark: i64) -> bool {
    if left == right {
        return false;
    }
    let after = |t: Option<i64>| t.is_some_and(|t| t > watermark);
    after(left) || after(right)
}
