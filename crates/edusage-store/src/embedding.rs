//! uint8 embedding quantization for the `chunk_embeddings` table.

use ndarray::Array1;

/// An embedding stored as one byte per dimension.
///
/// `value ≈ byte * scale + offset`, where `[min, max]` of the original vector
/// maps onto `[0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedEmbedding {
    pub bytes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
}

impl QuantizedEmbedding {
    pub fn from_vector(embedding: &Array1<f32>) -> Self {
        let (min, max) = embedding
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        if embedding.is_empty() || max - min < 1e-9 {
            return Self {
                bytes: vec![0; embedding.len()],
                scale: 0.0,
                offset: if embedding.is_empty() { 0.0 } else { min },
            };
        }

        let scale = (max - min) / 255.0;
        let bytes = embedding
            .iter()
            .map(|&v| ((v - min) / scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        Self {
            bytes,
            scale,
            offset: min,
        }
    }

    pub fn to_vector(&self) -> Array1<f32> {
        self.bytes
            .iter()
            .map(|&b| b as f32 * self.scale + self.offset)
            .collect()
    }

    pub fn dimension(&self) -> usize {
        self.bytes.len()
    }
}

/// Scale a vector to unit length. Returns `None` for a zero vector.
pub fn normalized(embedding: &Array1<f32>) -> Option<Array1<f32>> {
    let norm = embedding.dot(embedding).sqrt();
    (norm > 1e-9).then(|| embedding / norm)
}
