//! Raw stream buffer access
//!
//! [`RawBuffer`] wraps one dequeued `pw_buffer` and exposes its first data
//! block and crop metadata through [`FrameBuffer`]. [`StreamQueue`] is the
//! stream's queue of filled buffers seen through [`BufferQueue`].
//!
//! Buffers are only valid between dequeue and requeue, inside the stream's
//! `process` callback.

use std::ptr::NonNull;

use libspa_sys as spa_sys;
use pipewire::stream::StreamRef;
use pipewire::sys as pw_sys;

use pwplay_core::{BufferQueue, DisplayRect, FrameBuffer};

/// A buffer dequeued from a stream
#[derive(Debug)]
pub struct RawBuffer {
    buffer: NonNull<pw_sys::pw_buffer>,
}

impl RawBuffer {
    fn spa_buffer(&self) -> Option<&spa_sys::spa_buffer> {
        // SAFETY: `buffer` came from pw_stream_dequeue_buffer and is not
        // requeued while self exists; its spa_buffer lives as long.
        unsafe { self.buffer.as_ref().buffer.as_ref() }
    }

    fn first_data(&self) -> Option<&spa_sys::spa_data> {
        let spa_buffer = self.spa_buffer()?;
        if spa_buffer.n_datas == 0 {
            return None;
        }
        // SAFETY: n_datas > 0, so datas points to at least one element.
        unsafe { spa_buffer.datas.as_ref() }
    }

    fn chunk(&self) -> Option<&spa_sys::spa_chunk> {
        // SAFETY: the chunk of a mapped data block stays valid with the buffer.
        unsafe { self.first_data()?.chunk.as_ref() }
    }

    fn find_meta(&self, meta_type: u32) -> Option<&spa_sys::spa_meta> {
        let spa_buffer = self.spa_buffer()?;
        if spa_buffer.metas.is_null() {
            return None;
        }
        // SAFETY: metas holds n_metas initialized entries.
        let metas = unsafe { std::slice::from_raw_parts(spa_buffer.metas, spa_buffer.n_metas as usize) };
        metas.iter().find(|m| m.type_ == meta_type)
    }
}

impl FrameBuffer for RawBuffer {
    fn data(&mut self) -> Option<&[u8]> {
        let data = self.first_data()?;
        if data.data.is_null() || data.maxsize == 0 {
            return None;
        }

        let start = self.chunk().map_or(0, |c| c.offset.min(data.maxsize)) as usize;
        let len = data.maxsize as usize - start;

        // SAFETY: MAP_BUFFERS maps maxsize bytes at data.data for the
        // lifetime of the dequeued buffer; start <= maxsize.
        Some(unsafe { std::slice::from_raw_parts(data.data.cast::<u8>().add(start), len) })
    }

    fn chunk_size(&self) -> usize {
        self.chunk().map_or(0, |c| c.size as usize)
    }

    fn chunk_stride(&self) -> usize {
        self.chunk().map_or(0, |c| c.stride.max(0) as usize)
    }

    fn crop(&self) -> Option<DisplayRect> {
        let meta = self.find_meta(spa_sys::SPA_META_VideoCrop)?;
        if meta.data.is_null() || (meta.size as usize) < std::mem::size_of::<spa_sys::spa_meta_region>() {
            return None;
        }

        // SAFETY: the meta area is at least one spa_meta_region long.
        let region = unsafe { &(*meta.data.cast::<spa_sys::spa_meta_region>()).region };
        Some(DisplayRect::new(
            region.position.x,
            region.position.y,
            region.size.width,
            region.size.height,
        ))
    }
}

/// The filled-buffer queue of a stream
pub struct StreamQueue<'a> {
    stream: &'a StreamRef,
}

impl<'a> StreamQueue<'a> {
    /// Queue view of `stream`
    pub fn new(stream: &'a StreamRef) -> Self {
        Self { stream }
    }
}

impl BufferQueue for StreamQueue<'_> {
    type Buffer = RawBuffer;

    fn dequeue(&mut self) -> Option<RawBuffer> {
        // SAFETY: called from the process callback; a non-null buffer is
        // ours until it is queued back.
        let buffer = unsafe { self.stream.dequeue_raw_buffer() };
        NonNull::new(buffer).map(|buffer| RawBuffer { buffer })
    }

    fn requeue(&mut self, buffer: RawBuffer) {
        // SAFETY: the buffer was dequeued from this stream and is returned
        // exactly once, since RawBuffer is consumed here.
        unsafe { self.stream.queue_raw_buffer(buffer.buffer.as_ptr()) };
    }
}
