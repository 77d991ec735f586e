use ndarray::ArrayView2;

/// Binary foreground mask produced by a motion model: one byte per pixel,
/// non-zero meaning foreground, same dimensions as the source frame.
///
/// Ephemeral by design — consumed right after detection for the movement
/// decision and, optionally, for display overlay boxes.
#[derive(Clone, Debug)]
pub struct ForegroundMask {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Axis-aligned bounding box of one connected foreground blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ForegroundMask {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize),
            "mask length must equal width * height"
        );
        Self {
            data,
            width,
            height,
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

    pub fn as_ndarray(&self) -> ArrayView2<'_, u8> {
        ArrayView2::from_shape((self.height as usize, self.width as usize), &self.data)
            .expect("mask length must match dimensions")
    }

    pub fn foreground_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Fraction of pixels marked foreground, in `[0, 1]`.
    pub fn foreground_ratio(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.foreground_pixels() as f64 / self.data.len() as f64
    }

    /// Bounding boxes of 8-connected foreground blobs, found by seeded
    /// region growing over the mask.
    pub fn blob_boxes(&self) -> Vec<BlobBox> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut visited = vec![false; w * h];
        let mut boxes = Vec::new();

        for start in 0..w * h {
            if self.data[start] == 0 || visited[start] {
                continue;
            }

            let (mut min_x, mut min_y) = (start % w, start / w);
            let (mut max_x, mut max_y) = (min_x, min_y);
            let mut stack = vec![start];
            visited[start] = true;

            while let Some(idx) = stack.pop() {
                let x = idx % w;
                let y = idx / w;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let nidx = ny as usize * w + nx as usize;
                        if self.data[nidx] != 0 && !visited[nidx] {
                            visited[nidx] = true;
                            stack.push(nidx);
                        }
                    }
                }
            }

            boxes.push(BlobBox {
                x: min_x as u32,
                y: min_y as u32,
                width: (max_x - min_x + 1) as u32,
                height: (max_y - min_y + 1) as u32,
            });
        }

        boxes
    }
}
