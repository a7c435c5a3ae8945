/// Pre-allocated bounded byte region for raw pixel data.
///
/// The capture ingress and the scaler both own buffers sized for the largest
/// frame the engine can handle; copies into a `PixelBuffer` never write past
/// its capacity regardless of what the caller asks for.
///
/// # Example
/// ```rust
/// use scanline_core::prelude::PixelBuffer;
///
/// let mut buf = PixelBuffer::with_capacity(8);
/// let copied = buf.copy_bounded(&[1, 2, 3, 4], 16);
/// assert_eq!(copied, 4);
/// assert_eq!(&buf.as_slice()[..4], &[1, 2, 3, 4]);
/// ```
#[derive(Debug, Default)]
pub struct PixelBuffer {
    bytes: Option<Box<[u8]>>,
}

impl PixelBuffer {
    /// A buffer with no backing memory; `allocate` before use.
    pub const fn unallocated() -> Self {
        Self { bytes: None }
    }

    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Self::unallocated();
        buf.allocate(capacity);
        buf
    }

    /// (Re-)allocate the backing memory, discarding any prior contents.
    pub fn allocate(&mut self, capacity: usize) {
        self.bytes = Some(vec![0u8; capacity].into_boxed_slice());
    }

    /// Drop the backing memory; the buffer reads as empty afterwards.
    pub fn release(&mut self) {
        self.bytes = None;
    }

    /// Whether backing memory exists.
    pub fn is_allocated(&self) -> bool {
        self.bytes.is_some()
    }

    /// Capacity in bytes; zero when unallocated.
    pub fn capacity(&self) -> usize {
        self.bytes.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Borrow the full region; empty when unallocated.
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }

    /// Mutably borrow the full region; empty when unallocated.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.bytes.as_deref_mut().unwrap_or(&mut [])
    }

    /// The number of bytes a copy of `wanted` bytes would actually touch.
    pub fn bounded(&self, wanted: usize) -> usize {
        wanted.min(self.capacity())
    }

    /// Copy up to `wanted` bytes from `src`, bounded by both the source
    /// length and this buffer's capacity. Returns the number of bytes copied.
    pub fn copy_bounded(&mut self, src: &[u8], wanted: usize) -> usize {
        let len = self.bounded(wanted).min(src.len());
        self.as_mut_slice()[..len].copy_from_slice(&src[..len]);
        len
    }

    /// Fill the entire region with `value`.
    pub fn fill(&mut self, value: u8) {
        self.as_mut_slice().fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_is_bounded_by_capacity() {
        let mut buf = PixelBuffer::with_capacity(4);
        let copied = buf.copy_bounded(&[9u8; 100], 100);
        assert_eq!(copied, 4);
        assert_eq!(buf.as_slice(), &[9, 9, 9, 9]);
    }

    #[test]
    fn copy_is_bounded_by_request_and_source() {
        let mut buf = PixelBuffer::with_capacity(16);
        assert_eq!(buf.copy_bounded(&[1, 2, 3], 2), 2);
        assert_eq!(buf.copy_bounded(&[1, 2, 3], 8), 3);
    }

    #[test]
    fn unallocated_reads_empty() {
        let buf = PixelBuffer::unallocated();
        assert!(!buf.is_allocated());
        assert_eq!(buf.capacity(), 0);
        assert!(buf.as_slice().is_empty());
    }

    #[test]
    fn release_discards_backing() {
        let mut buf = PixelBuffer::with_capacity(8);
        buf.fill(7);
        buf.release();
        assert!(!buf.is_allocated());
        assert_eq!(buf.copy_bounded(&[1], 1), 0);
    }
}
