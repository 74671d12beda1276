//! Rendered frame buffers

use std::io::{self, Write};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// One RGBA8 pixel
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Colors for world elements
pub mod colors {
    use super::Rgba;

    pub const SKY: Rgba = Rgba::new(12, 12, 20);
    pub const FLOOR: Rgba = Rgba::new(150, 150, 140);
    pub const ROBOT: Rgba = Rgba::new(230, 200, 40);
    pub const BUTTON: Rgba = Rgba::new(200, 40, 40);
}

/// Row-major pixel buffer, origin top-left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Serialized as flat RGBA bytes
    #[serde(with = "pixel_bytes")]
    pub pixels: Vec<Rgba>,
}

mod pixel_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Rgba;

    pub fn serialize<S: Serializer>(pixels: &[Rgba], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytemuck::cast_slice(pixels))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Rgba>, D::Error> {
        let bytes = Vec::<u8>::deserialize(d)?;
        bytemuck::try_cast_slice::<u8, Rgba>(&bytes)
            .map(|pixels| pixels.to_vec())
            .map_err(|e| D::Error::custom(format!("bad pixel data: {e:?}")))
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, fill: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[(y * self.width + x) as usize])
        } else {
            None
        }
    }

    /// Set a pixel; writes outside the frame are clipped
    pub fn put(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.pixels[idx] = color;
    }

    /// Raw RGBA bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Encode as binary PPM (alpha dropped)
    pub fn write_ppm<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        let rgb: Vec<u8> = self.pixels.iter().flat_map(|p| [p.r, p.g, p.b]).collect();
        out.write_all(&rgb)
    }
}
