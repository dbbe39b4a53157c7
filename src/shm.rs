//! Shared-memory buffers
//!
//! `wl_shm` pools are mapped read-write so screencopy can write captured
//! pixels straight into client buffers. Buffers keep their pool mapping
//! alive; a pool resize remaps in place and every buffer sees the new
//! mapping.

use crate::state::CompositorState;
use log::{debug, warn};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;
use wayland_server::{
    backend::ObjectId,
    protocol::{wl_buffer, wl_shm, wl_shm_pool},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum,
};

/// Formats every compositor must accept
pub const SUPPORTED_FORMATS: [wl_shm::Format; 2] = [wl_shm::Format::Argb8888, wl_shm::Format::Xrgb8888];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShmError {
    #[error("buffer needs {needed} bytes but the pool has {available}")]
    OutOfBounds { needed: usize, available: usize },
    #[error("pixel data has {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
}

struct PoolMapping {
    file: File,
    map: MmapMut,
}

/// One client memory pool
pub struct ShmPool {
    inner: Mutex<PoolMapping>,
}

impl ShmPool {
    pub fn new(file: File, size: usize) -> std::io::Result<Self> {
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        Ok(Self {
            inner: Mutex::new(PoolMapping { file, map }),
        })
    }

    pub fn size(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Pools may only grow
    pub fn resize(&self, size: usize) -> std::io::Result<bool> {
        let mut inner = self.inner.lock();
        if size <= inner.map.len() {
            return Ok(false);
        }
        let map = unsafe { MmapOptions::new().len(size).map_mut(&inner.file)? };
        inner.map = map;
        Ok(true)
    }
}

/// Layout of one `wl_buffer` inside its pool
#[derive(Clone)]
pub struct ShmBuffer {
    pool: Arc<ShmPool>,
    pub offset: usize,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: WEnum<wl_shm::Format>,
}

impl std::fmt::Debug for ShmBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmBuffer")
            .field("offset", &self.offset)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish()
    }
}

impl ShmBuffer {
    pub fn new(
        pool: Arc<ShmPool>,
        offset: usize,
        width: i32,
        height: i32,
        stride: i32,
        format: WEnum<wl_shm::Format>,
    ) -> Self {
        Self {
            pool,
            offset,
            width,
            height,
            stride,
            format,
        }
    }

    /// Bytes covered by the buffer, `stride * height`
    pub fn byte_len(&self) -> usize {
        self.stride.max(0) as usize * self.height.max(0) as usize
    }

    fn range(&self, available: usize) -> Result<std::ops::Range<usize>, ShmError> {
        let needed = self.offset + self.byte_len();
        if needed > available {
            return Err(ShmError::OutOfBounds { needed, available });
        }
        Ok(self.offset..needed)
    }

    /// Copy `stride * height` bytes into the client's memory
    pub fn write(&self, data: &[u8]) -> Result<(), ShmError> {
        if data.len() != self.byte_len() {
            return Err(ShmError::WrongLength {
                expected: self.byte_len(),
                actual: data.len(),
            });
        }
        let mut inner = self.pool.inner.lock();
        let range = self.range(inner.map.len())?;
        inner.map[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>, ShmError> {
        let inner = self.pool.inner.lock();
        let range = self.range(inner.map.len())?;
        Ok(inner.map[range].to_vec())
    }
}

/// Live `wl_buffer`s backed by shared memory
#[derive(Debug, Default)]
pub struct BufferStore {
    buffers: HashMap<ObjectId, ShmBuffer>,
}

impl BufferStore {
    pub fn insert(&mut self, buffer: &wl_buffer::WlBuffer, shm: ShmBuffer) {
        self.buffers.insert(buffer.id(), shm);
    }

    pub fn remove(&mut self, buffer: &wl_buffer::WlBuffer) -> Option<ShmBuffer> {
        self.buffers.remove(&buffer.id())
    }

    /// `None` for buffers that are not shm buffers
    pub fn get(&self, buffer: &wl_buffer::WlBuffer) -> Option<&ShmBuffer> {
        self.buffers.get(&buffer.id())
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Check a `create_buffer` request against the pool size
pub fn validate_buffer_layout(
    pool_size: usize,
    offset: i32,
    width: i32,
    height: i32,
    stride: i32,
    format: WEnum<wl_shm::Format>,
) -> Result<(), (wl_shm::Error, String)> {
    match format {
        WEnum::Value(f) if SUPPORTED_FORMATS.contains(&f) => {}
        other => {
            return Err((wl_shm::Error::InvalidFormat, format!("unsupported format {:?}", other)));
        }
    }
    if offset < 0 || width <= 0 || height <= 0 || stride < width.saturating_mul(4) {
        return Err((
            wl_shm::Error::InvalidStride,
            format!(
                "invalid buffer geometry offset {} size {}x{} stride {}",
                offset, width, height, stride
            ),
        ));
    }
    let needed = offset as usize + stride as usize * height as usize;
    if needed > pool_size {
        return Err((
            wl_shm::Error::InvalidStride,
            format!("buffer needs {} bytes, pool has {}", needed, pool_size),
        ));
    }
    Ok(())
}

impl GlobalDispatch<wl_shm::WlShm, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        for format in SUPPORTED_FORMATS {
            shm.format(format);
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, fd, size } = request {
            if size <= 0 {
                resource.post_error(wl_shm::Error::InvalidStride, format!("invalid pool size {}", size));
                return;
            }
            let file = File::from(fd);
            match ShmPool::new(file, size as usize) {
                Ok(pool) => {
                    data_init.init(id, Arc::new(pool));
                }
                Err(e) => {
                    warn!("Failed to map shm pool of {} bytes: {}", size, e);
                    resource.post_error(wl_shm::Error::InvalidFd, format!("mmap failed: {}", e));
                }
            }
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, Arc<ShmPool>> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        data: &Arc<ShmPool>,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                if let Err((code, message)) =
                    validate_buffer_layout(data.size(), offset, width, height, stride, format)
                {
                    resource.post_error(code, message);
                    return;
                }
                let buffer = data_init.init(id, ());
                let shm = ShmBuffer::new(data.clone(), offset as usize, width, height, stride, format);
                state.buffers.insert(&buffer, shm);
            }
            wl_shm_pool::Request::Resize { size } => match data.resize(size.max(0) as usize) {
                Ok(true) => debug!("shm pool grown to {} bytes", size),
                Ok(false) => {
                    resource.post_error(wl_shm::Error::InvalidStride, "shm pools can only grow");
                }
                Err(e) => {
                    resource.post_error(wl_shm::Error::InvalidFd, format!("mremap failed: {}", e));
                }
            },
            wl_shm_pool::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_buffer::WlBuffer,
        request: wl_buffer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_buffer::Request::Destroy = request {
            state.buffers.remove(resource);
        }
    }

    fn destroyed(state: &mut Self, _client: wayland_server::backend::ClientId, resource: &wl_buffer::WlBuffer, _data: &()) {
        state.buffers.remove(resource);
    }
}
