use anyhow::anyhow;
use mnemo_shared::EngineError;

/// Dimensionality of every vector written to the index. Fixed at
/// collection creation and never altered.
pub const EMBEDDING_DIM: usize = 1024;

const L2_NORM_TOLERANCE: f32 = 1e-6;

/// Coerce a gateway embedding to exactly [`EMBEDDING_DIM`] dimensions.
///
/// Oversized vectors (models that ignore the `dimensions` request
/// parameter) are truncated and re-normalized; undersized vectors are
/// rejected.
pub(crate) fn process_embedding(mut vec: Vec<f32>) -> Result<Vec<f32>, EngineError> {
  match vec.len() {
    d if d > EMBEDDING_DIM => {
      vec.truncate(EMBEDDING_DIM);
      l2_normalize(&mut vec);
      Ok(vec)
    }
    d if d == EMBEDDING_DIM => {
      let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
      if (norm_sq - 1.0).abs() > L2_NORM_TOLERANCE {
        l2_normalize(&mut vec);
      }
      Ok(vec)
    }
    d => Err(EngineError::fatal(anyhow!(
      "embedding dimension {d} is less than required {EMBEDDING_DIM}"
    ))),
  }
}

fn l2_normalize(vec: &mut [f32]) {
  let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 1e-12 {
    for x in vec.iter_mut() {
      *x /= norm;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn oversized_embedding_is_truncated_and_normalized() {
    let vec = vec![1.0; EMBEDDING_DIM + 512];
    let out = process_embedding(vec).unwrap();
    assert_eq!(out.len(), EMBEDDING_DIM);
    let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
  }

  #[test]
  fn undersized_embedding_is_rejected() {
    assert!(process_embedding(vec![0.5; 8]).is_err());
  }

  #[test]
  fn exact_dimension_passes_through() {
    let mut vec = vec![0.0; EMBEDDING_DIM];
    vec[0] = 1.0;
    let out = process_embedding(vec).unwrap();
    assert_eq!(out.len(), EMBEDDING_DIM);
    assert!((out[0] - 1.0).abs() < f32::EPSILON);
  }
}
