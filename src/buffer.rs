// buffer.rs -- concrete array storage bound to graph sources and
// outputs.
//
// Layout is row-major with axis 0 fastest: for a 2-D buffer of shape
// [w, h], element (x, y) lives at flat index x + y * w. A rank-0
// buffer holds exactly one element.

use crate::gpu::{DeviceBuffer, GpuDevice, TransferError};
use crate::value::{DType, Value};

/// Element types a [`Buffer`] can store.
pub trait Elem:
    Copy + Default + bytemuck::Pod + std::fmt::Debug + Send + Sync + 'static
{
    const DTYPE: DType;

    fn to_value(self) -> Value;
    fn from_value(v: Value) -> Self;
}

impl Elem for f32 {
    const DTYPE: DType = DType::F32;

    fn to_value(self) -> Value {
        Value::F32(self)
    }

    fn from_value(v: Value) -> Self {
        match v.cast(DType::F32) {
            Value::F32(x) => x,
            _ => unreachable!(),
        }
    }
}

impl Elem for u8 {
    const DTYPE: DType = DType::U8;

    fn to_value(self) -> Value {
        Value::U8(self)
    }

    fn from_value(v: Value) -> Self {
        match v.cast(DType::U8) {
            Value::U8(x) => x,
            _ => unreachable!(),
        }
    }
}

impl Elem for u32 {
    const DTYPE: DType = DType::U32;

    fn to_value(self) -> Value {
        Value::U32(self)
    }

    fn from_value(v: Value) -> Self {
        match v.cast(DType::U32) {
            Value::U32(x) => x,
            _ => unreachable!(),
        }
    }
}

impl Elem for i32 {
    const DTYPE: DType = DType::I32;

    fn to_value(self) -> Value {
        Value::I32(self)
    }

    fn from_value(v: Value) -> Self {
        match v.cast(DType::I32) {
            Value::I32(x) => x,
            _ => unreachable!(),
        }
    }
}

/// Rank 0 holds a single element; any zero extent gives an empty
/// buffer.
fn logical_len(shape: &[usize]) -> usize {
    if shape.is_empty() {
        1
    } else {
        shape.iter().product()
    }
}

/// Where the authoritative copy of a buffer currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    HostOnly,
    DeviceOnly,
    Synced,
}

/// A typed n-dimensional array with an optional device mirror.
pub struct Buffer<T: Elem> {
    shape: Vec<usize>,
    data: Vec<T>,
    residency: Residency,
    device: Option<DeviceBuffer>,
}

impl<T: Elem> Buffer<T> {
    pub fn new(shape: &[usize]) -> Self {
        let len = logical_len(shape);
        Self {
            shape: shape.to_vec(),
            data: vec![T::default(); len],
            residency: Residency::HostOnly,
            device: None,
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<T>) -> Self {
        let expected = logical_len(shape);
        assert_eq!(data.len(), expected, "buffer data does not match shape");
        Self {
            shape: shape.to_vec(),
            data,
            residency: Residency::HostOnly,
            device: None,
        }
    }

    pub fn filled(shape: &[usize], value: T) -> Self {
        Self::from_vec(shape, vec![value; logical_len(shape)])
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    pub fn height(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(1)
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    fn flat_index(&self, coords: &[usize]) -> usize {
        debug_assert_eq!(coords.len(), self.shape.len());
        let mut idx = 0;
        let mut stride = 1;
        for (c, dim) in coords.iter().zip(&self.shape) {
            debug_assert!(c < dim);
            idx += c * stride;
            stride *= dim;
        }
        idx
    }

    pub fn get(&self, coords: &[usize]) -> T {
        self.data[self.flat_index(coords)]
    }

    pub fn set(&mut self, coords: &[usize], value: T) {
        let idx = self.flat_index(coords);
        self.data[idx] = value;
        self.mark_host_written();
    }

    /// Bounds-checked read by signed coordinates, as graph leaf reads
    /// see them. Returns `None` when any coordinate falls outside the
    /// buffer.
    pub fn value_at(&self, coords: &[i64]) -> Option<Value> {
        if coords.len() != self.shape.len() {
            return None;
        }
        let mut idx = 0usize;
        let mut stride = 1usize;
        for (&c, &dim) in coords.iter().zip(&self.shape) {
            if c < 0 || c >= dim as i64 {
                return None;
            }
            idx += c as usize * stride;
            stride *= dim;
        }
        Some(self.data[idx].to_value())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.mark_host_written();
        &mut self.data
    }

    /// Marks the host copy as the authoritative one.
    pub fn mark_host_written(&mut self) {
        if self.device.is_some() {
            self.residency = Residency::HostOnly;
        }
    }

    /// Marks the device copy as the authoritative one, after a kernel
    /// has written into it.
    pub fn mark_device_written(&mut self) {
        if self.device.is_some() {
            self.residency = Residency::DeviceOnly;
        }
    }

    /// Pushes the host contents to the device, allocating the mirror
    /// on first use.
    pub fn to_device(&mut self, dev: &GpuDevice) -> Result<(), TransferError> {
        if self.residency == Residency::Synced || self.residency == Residency::DeviceOnly {
            return Ok(());
        }
        let bytes = bytemuck::cast_slice(&self.data);
        match &self.device {
            Some(buf) => buf.write(dev, bytes),
            None => {
                self.device = Some(DeviceBuffer::upload(dev, "pyrite buffer", bytes)?);
            }
        }
        self.residency = Residency::Synced;
        Ok(())
    }

    /// Pulls the device contents back to the host when the device copy
    /// is the fresh one.
    pub fn to_host(&mut self, dev: &GpuDevice) -> Result<(), TransferError> {
        if self.residency != Residency::DeviceOnly {
            return Ok(());
        }
        let buf = match &self.device {
            Some(b) => b,
            None => return Err(TransferError::NoAccelerator),
        };
        let bytes = buf.download(dev)?;
        // pod_collect_to_vec copies, so the byte vec's alignment does
        // not matter.
        self.data = bytemuck::pod_collect_to_vec(&bytes);
        self.residency = Residency::Synced;
        Ok(())
    }

    /// Blocks until outstanding device work touching this buffer has
    /// completed.
    pub fn sync(&self, dev: &GpuDevice) {
        dev.sync();
    }

    pub fn device_buffer(&self) -> Option<&DeviceBuffer> {
        self.device.as_ref()
    }
}

/// Type-erased immutable view for binding buffers as graph sources.
pub enum BufRef<'a> {
    F32(&'a Buffer<f32>),
    U8(&'a Buffer<u8>),
    U32(&'a Buffer<u32>),
    I32(&'a Buffer<i32>),
}

impl<'a> BufRef<'a> {
    pub fn dtype(&self) -> DType {
        match self {
            BufRef::F32(_) => DType::F32,
            BufRef::U8(_) => DType::U8,
            BufRef::U32(_) => DType::U32,
            BufRef::I32(_) => DType::I32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            BufRef::F32(b) => b.shape(),
            BufRef::U8(b) => b.shape(),
            BufRef::U32(b) => b.shape(),
            BufRef::I32(b) => b.shape(),
        }
    }

    pub fn value_at(&self, coords: &[i64]) -> Option<Value> {
        match self {
            BufRef::F32(b) => b.value_at(coords),
            BufRef::U8(b) => b.value_at(coords),
            BufRef::U32(b) => b.value_at(coords),
            BufRef::I32(b) => b.value_at(coords),
        }
    }
}

impl<'a> From<&'a Buffer<f32>> for BufRef<'a> {
    fn from(b: &'a Buffer<f32>) -> Self {
        BufRef::F32(b)
    }
}

impl<'a> From<&'a Buffer<u8>> for BufRef<'a> {
    fn from(b: &'a Buffer<u8>) -> Self {
        BufRef::U8(b)
    }
}

impl<'a> From<&'a Buffer<u32>> for BufRef<'a> {
    fn from(b: &'a Buffer<u32>) -> Self {
        BufRef::U32(b)
    }
}

impl<'a> From<&'a Buffer<i32>> for BufRef<'a> {
    fn from(b: &'a Buffer<i32>) -> Self {
        BufRef::I32(b)
    }
}

/// Type-erased mutable view for realizing pipeline outputs.
pub enum BufMut<'a> {
    F32(&'a mut Buffer<f32>),
    U8(&'a mut Buffer<u8>),
    U32(&'a mut Buffer<u32>),
    I32(&'a mut Buffer<i32>),
}

impl<'a> BufMut<'a> {
    pub fn dtype(&self) -> DType {
        match self {
            BufMut::F32(_) => DType::F32,
            BufMut::U8(_) => DType::U8,
            BufMut::U32(_) => DType::U32,
            BufMut::I32(_) => DType::I32,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            BufMut::F32(b) => b.shape().to_vec(),
            BufMut::U8(b) => b.shape().to_vec(),
            BufMut::U32(b) => b.shape().to_vec(),
            BufMut::I32(b) => b.shape().to_vec(),
        }
    }

    /// Writes one element by flat index, casting `v` to the buffer's
    /// element type.
    pub fn put_flat(&mut self, idx: usize, v: Value) {
        match self {
            BufMut::F32(b) => b.as_mut_slice()[idx] = f32::from_value(v),
            BufMut::U8(b) => b.as_mut_slice()[idx] = u8::from_value(v),
            BufMut::U32(b) => b.as_mut_slice()[idx] = u32::from_value(v),
            BufMut::I32(b) => b.as_mut_slice()[idx] = i32::from_value(v),
        }
    }
}

impl<'a> From<&'a mut Buffer<f32>> for BufMut<'a> {
    fn from(b: &'a mut Buffer<f32>) -> Self {
        BufMut::F32(b)
    }
}

impl<'a> From<&'a mut Buffer<u8>> for BufMut<'a> {
    fn from(b: &'a mut Buffer<u8>) -> Self {
        BufMut::U8(b)
    }
}

impl<'a> From<&'a mut Buffer<u32>> for BufMut<'a> {
    fn from(b: &'a mut Buffer<u32>) -> Self {
        BufMut::U32(b)
    }
}

impl<'a> From<&'a mut Buffer<i32>> for BufMut<'a> {
    fn from(b: &'a mut Buffer<i32>) -> Self {
        BufMut::I32(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_is_x_fastest() {
        let mut buf = Buffer::<u8>::new(&[3, 2]);
        buf.set(&[2, 0], 5);
        buf.set(&[0, 1], 9);
        assert_eq!(buf.as_slice(), &[0, 0, 5, 9, 0, 0]);
    }

    #[test]
    fn rank_zero_holds_one_element() {
        let buf = Buffer::<i32>::from_vec(&[], vec![42]);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.value_at(&[]), Some(Value::I32(42)));
    }

    #[test]
    fn value_at_rejects_out_of_bounds() {
        let buf = Buffer::<f32>::new(&[4, 4]);
        assert!(buf.value_at(&[-1, 0]).is_none());
        assert!(buf.value_at(&[0, 4]).is_none());
        assert!(buf.value_at(&[3, 3]).is_some());
    }

    #[test]
    fn bufmut_put_flat_casts() {
        let mut buf = Buffer::<u8>::new(&[2]);
        let mut view = BufMut::from(&mut buf);
        view.put_flat(0, Value::F32(3.9));
        view.put_flat(1, Value::I32(-1));
        assert_eq!(buf.as_slice(), &[3, 255]);
    }
}
