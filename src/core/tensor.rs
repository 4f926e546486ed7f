//! Feature and output tensors with tracked lifetimes.
//!
//! Every tensor is registered with a [`TensorTracker`] when it is allocated
//! and unregistered when it is dropped, so buffers are released on every exit
//! path of an inference call. The tracker makes leaks observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Tensor shape mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tensor shape mismatch: expected {expected:?}, got {actual:?}")]
pub struct ShapeError {
    pub expected: Vec<usize>,
    pub actual: Vec<usize>,
}

/// Counts live tensors and the bytes they hold.
#[derive(Debug, Default)]
pub struct TensorTracker {
    live: AtomicU64,
    live_bytes: AtomicU64,
    allocated: AtomicU64,
}

impl TensorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tensors currently alive.
    pub fn live(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Bytes held by live tensors.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::SeqCst)
    }

    /// Total tensors ever allocated.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }

    fn acquire(&self, bytes: u64) {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.allocated.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, bytes: u64) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
    }
}

/// Thread-safe shared tracker.
pub type SharedTensorTracker = Arc<TensorTracker>;

/// A dense row-major `f32` tensor.
#[derive(Debug)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    bytes: u64,
    tracker: SharedTensorTracker,
}

impl Tensor {
    /// Allocate a zero-filled tensor.
    pub fn zeros(shape: &[usize], tracker: &SharedTensorTracker) -> Self {
        let len = shape.iter().product();
        Self::register(shape.to_vec(), vec![0.0; len], tracker)
    }

    /// Wrap an existing buffer; its length must match the shape.
    pub fn from_vec(
        shape: &[usize],
        data: Vec<f32>,
        tracker: &SharedTensorTracker,
    ) -> Result<Self, ShapeError> {
        let len: usize = shape.iter().product();
        if data.len() != len {
            return Err(ShapeError {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self::register(shape.to_vec(), data, tracker))
    }

    fn register(shape: Vec<usize>, data: Vec<f32>, tracker: &SharedTensorTracker) -> Self {
        let bytes = std::mem::size_of_val(data.as_slice()) as u64;
        tracker.acquire(bytes);
        Self {
            shape,
            data,
            bytes,
            tracker: Arc::clone(tracker),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn expect_shape(&self, expected: &[usize]) -> Result<(), ShapeError> {
        if self.shape == expected {
            Ok(())
        } else {
            Err(ShapeError {
                expected: expected.to_vec(),
                actual: self.shape.clone(),
            })
        }
    }

    /// Move the values out; the tensor itself is released.
    pub fn into_vec(mut self) -> Vec<f32> {
        std::mem::take(&mut self.data)
    }

    pub fn tracker(&self) -> &SharedTensorTracker {
        &self.tracker
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        self.tracker.release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_releases() {
        let tracker = Arc::new(TensorTracker::new());
        {
            let t = Tensor::zeros(&[1, 168, 13], &tracker);
            assert_eq!(t.data().len(), 168 * 13);
            assert_eq!(tracker.live(), 1);
            assert_eq!(tracker.live_bytes(), (168 * 13 * 4) as u64);
        }
        assert_eq!(tracker.live(), 0);
        assert_eq!(tracker.live_bytes(), 0);
        assert_eq!(tracker.allocated(), 1);
    }

    #[test]
    fn test_from_vec_checks_length() {
        let tracker = Arc::new(TensorTracker::new());
        assert!(Tensor::from_vec(&[1, 2], vec![0.5], &tracker).is_err());
        assert_eq!(tracker.live(), 0);

        let t = Tensor::from_vec(&[1, 2], vec![0.5, 0.25], &tracker).unwrap();
        assert!(t.expect_shape(&[1, 2]).is_ok());
        assert!(t.expect_shape(&[2]).is_err());
        assert_eq!(t.into_vec(), vec![0.5, 0.25]);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_release_on_early_return() {
        fn fails(tracker: &SharedTensorTracker) -> Result<(), ShapeError> {
            let t = Tensor::zeros(&[1, 4], tracker);
            t.expect_shape(&[1, 5])?;
            Ok(())
        }

        let tracker = Arc::new(TensorTracker::new());
        assert!(fails(&tracker).is_err());
        assert_eq!(tracker.live(), 0);
    }
}
