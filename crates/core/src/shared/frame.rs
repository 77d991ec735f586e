use ndarray::{ArrayView3, ArrayViewMut3};

/// A single decoded video frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the detection layer
/// derives its own intensity plane and never mutates the frame. Playback may
/// draw overlay rectangles into a frame it owns for display purposes.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of this frame in decode order. After a seek this restarts
    /// from the source's estimated frame counter.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Single-channel intensity plane (ITU-R BT.601 luma weights), row-major.
    pub fn to_intensity(&self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        if self.channels == 1 {
            return self.data.clone();
        }
        let c = self.channels as usize;
        let mut out = Vec::with_capacity(w * h);
        for px in self.data.chunks_exact(c) {
            let y = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
            out.push(y.round().clamp(0.0, 255.0) as u8);
        }
        out
    }

    /// Draws an axis-aligned rectangle outline of the given thickness,
    /// clamped to the frame bounds. Display-only; the pipeline never reads
    /// annotated pixels.
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, thickness: u32, color: [u8; 3]) {
        if self.channels != 3 || w == 0 || h == 0 {
            return;
        }
        let x1 = (x + w).min(self.width);
        let y1 = (y + h).min(self.height);
        for row in y..y1 {
            for col in x..x1 {
                let on_border = row < y + thickness
                    || row + thickness >= y1
                    || col < x + thickness
                    || col + thickness >= x1;
                if on_border {
                    let offset = ((row * self.width + col) * 3) as usize;
                    self.data[offset..offset + 3].copy_from_slice(&color);
                }
            }
        }
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
