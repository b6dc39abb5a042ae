use crate::record::Point;

/// In-memory buffer of points waiting to be flushed.
///
/// Owned by the sink worker; every read of the buffer goes through
/// [`Batcher::take`], which swaps the contents out and leaves it empty.
#[derive(Debug)]
pub(crate) struct Batcher {
    buffer: Vec<Point>,
    max_buffered: usize,
}

impl Batcher {
    pub fn new(max_buffered: usize) -> Self {
        let max_buffered = max_buffered.max(1);
        Self {
            buffer: Vec::with_capacity(max_buffered),
            max_buffered,
        }
    }

    /// Append `point`. Returns the full batch when the size threshold is
    /// reached.
    pub fn push(&mut self, point: Point) -> Option<Vec<Point>> {
        self.buffer.push(point);
        if self.buffer.len() >= self.max_buffered {
            Some(self.take())
        } else {
            None
        }
    }

    /// Swap out everything buffered so far.
    pub fn take(&mut self) -> Vec<Point> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.max_buffered))
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TagSet, ValueSet};
    use chrono::Utc;
    use serde_json::json;

    fn point(n: i64) -> Point {
        let mut values = ValueSet::new();
        values.insert("n".into(), json!(n));
        Point::stamped(values, TagSet::new(), Utc::now())
    }

    #[test]
    fn size_threshold_returns_full_batch() {
        let mut batcher = Batcher::new(3);
        assert!(batcher.push(point(1)).is_none());
        assert!(batcher.push(point(2)).is_none());
        let batch = batcher.push(point(3)).unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batcher.is_empty());
        let ns: Vec<_> = batch.iter().map(|p| p.values["n"].clone()).collect();
        assert_eq!(ns, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn take_leaves_buffer_empty() {
        let mut batcher = Batcher::new(10);
        batcher.push(point(1));
        batcher.push(point(2));

        assert_eq!(batcher.take().len(), 2);
        assert!(batcher.is_empty());
        assert!(batcher.take().is_empty());

        // Points added after a swap go into the next batch only.
        batcher.push(point(3));
        let next = batcher.take();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].values["n"], json!(3));
    }

    #[test]
    fn threshold_of_one_flushes_every_point() {
        let mut batcher = Batcher::new(1);
        assert_eq!(batcher.push(point(1)).map(|b| b.len()), Some(1));
        assert_eq!(batcher.push(point(2)).map(|b| b.len()), Some(1));
    }
}
