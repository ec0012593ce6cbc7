use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use log::debug;

use crate::error::{Error, Result};

use super::FrameId;

/// Replacer tracks frame usage for replacement in case of buffer pool is full.
pub trait Replacer {
    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    ///
    /// Return an invalid frame id error if the frame id is out of the range the
    /// replacer was built for.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Find the frame to evict with replace policy(backward k-distance). Only frames
    /// that are marked as evictable are candidates for eviction.
    ///
    /// Successful eviction of a frame should decrement the size of replacer and remove
    /// the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no frames can
    /// be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. this function also control
    /// replacer size. Note that size is equal to number of evictable entries.
    ///
    /// If a frame was previously evictable and is to be set to non-evictable, then size
    /// should decrement. If a frame was previously non-evictable and is to be set
    /// evictable, then size should increment.
    ///
    /// Return an invalid frame id error if the frame id is out of the range the
    /// replacer was built for.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()>;

    /// Check if a frame is evictable. if the frame is not found, return true.
    fn is_evictable(&self, frame_id: FrameId) -> bool;

    /// Remove an evictable frame from replacer, along with its access history. This
    /// function should also decrement the replacer size if removal is successful.
    ///
    /// Note that this is different from evicting a frame, which always removes the frame
    /// with the largest backward k-distance.
    ///
    /// If remove is called on a non-evictable frame, return an error. If the specified
    /// frame is not found, do nothing without return any error.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// replacer size, i.e. the number of evictable frames.
    fn size(&self) -> usize;
}

#[derive(Debug, Eq, PartialEq)]
struct KDistance {
    frame_id: FrameId,
    distance: u64,
    first_access_at: u64,
}

impl PartialOrd for KDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        // largest distance first, ties go to the earliest first access.
        // timestamps are handed out once, so the order is total.
        match self.distance.cmp(&other.distance).reverse() {
            Ordering::Equal => self.first_access_at.cmp(&other.first_access_at),
            other => other,
        }
    }
}

struct LRUKNode {
    k: usize,
    frame_id: FrameId,
    is_evictable: bool,
    /// history of last seen K timestamp of the given frame.
    /// Least recent timestamp stored in front.
    history: VecDeque<u64>,
}

impl LRUKNode {
    fn new(frame_id: FrameId, k: usize) -> Self {
        assert!(k > 0, "replacer k should be larger than zero");
        LRUKNode { history: VecDeque::with_capacity(k), k, frame_id, is_evictable: false }
    }

    fn record_access(&mut self, timestamp: u64) {
        if self.history.len() == self.k {
            self.history.pop_front();
        }
        self.history.push_back(timestamp)
    }

    /// Backward k-distance as of `now`: the age of the k-th most recent access,
    /// or +inf (modelled as u64::MAX) with fewer than k accesses on record.
    fn k_distance(&self, now: u64) -> KDistance {
        // a tracked frame always has at least one access on record.
        let first = self.history.front().copied().unwrap_or(0);
        if self.history.len() < self.k {
            return KDistance { frame_id: self.frame_id, distance: u64::MAX, first_access_at: first };
        }
        let kth = self.history[self.history.len() - self.k];
        KDistance { frame_id: self.frame_id, distance: now - kth, first_access_at: first }
    }
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts a frame whose backward k-distance is maximum of
/// all frames. Backward k-distance is computed as the difference in time between
/// the current timestamp and the timestamp of k-th previous access. Time is a
/// logical clock that advances by one on every recorded access.
///
/// A frame with less than k history references is given +inf as its backward
/// k-distance. When multiple frames have +inf backward k-distance, the frame
/// with the earliest overall access is chosen as the victim.
pub struct LRUKReplacer {
    nodes: HashMap<FrameId, LRUKNode>,
    current_timestamp: u64,
    current_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        let nodes = HashMap::new();
        LRUKReplacer { nodes, current_timestamp: 0, current_size: 0, replacer_size: num_frames, k }
    }

    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    /// A frame starts out non-evictable; recording an access on a tracked frame
    /// leaves its evictable flag untouched.
    pub fn record_access(&mut self, frame_id: FrameId) -> Result<()> {
        if frame_id >= self.replacer_size {
            return Err(Error::InvalidFrameId(frame_id));
        }
        let k = self.k;
        let node = self.nodes.entry(frame_id).or_insert_with(|| LRUKNode::new(frame_id, k));
        node.record_access(self.current_timestamp);
        self.current_timestamp += 1;
        Ok(())
    }

    /// Find the frame with the largest backward k-distance and evict that frame.
    /// Only frames that are marked as evictable are candidates for eviction.
    ///
    /// A frame with less than k historical references is given +inf as its backward
    /// k-distance. If multiple frames have +inf backward k-distance, then evict the
    /// frame with the earliest timestamp overall.
    ///
    /// Successful eviction of a frame should decrement the size of replacer and
    /// remove the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no frames
    /// can be evicted.
    pub fn evict(&mut self) -> Option<FrameId> {
        let mut distances = vec![];
        for node in self.nodes.values() {
            if !node.is_evictable {
                continue;
            }
            distances.push(node.k_distance(self.current_timestamp));
        }
        if distances.is_empty() {
            return None;
        }

        distances.sort();

        // we will always have at least one element here, it is
        // okay to use unwrap.
        let victim = distances.first().unwrap().frame_id;
        self.nodes.remove(&victim);
        self.current_size -= 1;
        debug!("evicted frame {}, {} evictable frames left", victim, self.current_size);

        Some(victim)
    }

    /// Toggle whether a frame is evictable or non-evictable. this function also
    /// control replacer size. Note that size is equal to number of evictable entries.
    ///
    /// If a frame was previously evictable and is to be set to non-evictable, then
    /// size should decrement. If a frame was previously non-evictable and is to be
    /// set evictable, then size should increment.
    ///
    /// For a frame that is not tracked or whose flag is unchanged, this function
    /// terminates without modifying anything.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> Result<()> {
        if frame_id >= self.replacer_size {
            return Err(Error::InvalidFrameId(frame_id));
        }
        let node = match self.nodes.get_mut(&frame_id) {
            Some(node) => node,
            None => return Ok(()),
        };
        if node.is_evictable == evictable {
            return Ok(());
        }

        node.is_evictable = evictable;
        if evictable {
            self.current_size += 1;
        } else {
            self.current_size -= 1;
        }
        Ok(())
    }

    /// Check if a frame is evictable. if the frame is not found, return true.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        match self.nodes.get(&frame_id) {
            Some(node) => node.is_evictable,
            None => true,
        }
    }

    /// Remove an evictable frame from replacer, along with its access history.
    /// This function should also decrement the replacer size if removal is
    /// successful.
    ///
    /// Note that this is different from evicting a frame, which always removes
    /// the frame with the largest backward k-distance. This function removes the
    /// specified frame id, no matter what its backward k-distance is.
    ///
    /// If remove is called on a non-evictable frame, return an error. If the
    /// specified frame is not found, do nothing without return any error.
    pub fn remove(&mut self, frame_id: FrameId) -> Result<()> {
        let node = match self.nodes.get(&frame_id) {
            Some(node) => node,
            None => return Ok(()),
        };
        if !node.is_evictable {
            return Err(Error::FrameNotEvictable(frame_id));
        }
        self.nodes.remove(&frame_id);
        self.current_size -= 1;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.current_size
    }
}

/// SyncLRUKReplacer implements the thread-safe version of LRU-k replacement policy,
/// basically all the heavy lifting are happens in the LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        let inner = Mutex::new(LRUKReplacer::new(num_frames, k));
        SyncLRUKReplacer { inner }
    }
}

impl Replacer for SyncLRUKReplacer {
    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.record_access(frame_id)
    }

    /// Find the frame with the largest backward k-distance and evict that frame.
    /// Only frames that are marked as evictable are candidates for eviction.
    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    /// Toggle whether a frame is evictable or non-evictable. this function also
    /// control replacer size. Note that size is equal to number of evictable entries.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.set_evictable(frame_id, evictable)
    }

    /// Check if a frame is evictable. if the frame is not found, return true.
    fn is_evictable(&self, frame_id: FrameId) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.is_evictable(frame_id)
    }

    /// Remove an evictable frame from replacer, along with its access history.
    /// This function should also decrement the replacer size if removal is
    /// successful.
    fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.remove(frame_id)
    }

    /// replacer size, i.e. the number of evictable frames.
    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}
