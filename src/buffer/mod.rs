pub mod replacer;

/// Identifies a frame in the buffer pool. The namespace is owned by the
/// caller: valid ids range over [0, pool size).
pub type FrameId = usize;
