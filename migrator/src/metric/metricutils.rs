// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use log::error;
use tsz::decode::Error;
use tsz::stream::{BufferedReader, BufferedWriter};
use tsz::Encode;
use tsz::{Decode, StdDecoder, StdEncoder};

use crate::metric::sample::Sample;
use crate::utils::error::ChunkError;

/// Decompress the given vector of u8 integers to a Sample vector.
pub fn decompress_sample_vector(compressed: &[u8]) -> Result<Vec<Sample>, ChunkError> {
  let r = BufferedReader::new(compressed.to_owned().into_boxed_slice());
  let mut decoder = StdDecoder::new(r);

  let mut tsz_data_points = Vec::new();
  loop {
    match decoder.next() {
      Ok(dp) => {
        tsz_data_points.push(dp);
      }
      Err(Error::EndOfStream) => break,
      Err(err) => {
        let err_string = err.to_string();
        error!("Could not decode time series {}", err_string);
        return Err(ChunkError::CannotDecodeTimeSeries(err_string));
      }
    };
  }

  // We convert to/from tsz::DataPoint here to keep tsz out of the public API.
  let samples = tsz_data_points
    .into_iter()
    .map(Sample::new_from_tsz_data_point)
    .collect();

  Ok(samples)
}

/// Whether the encoder can store `delta` after `previous_delta`. The delta-of-delta is written to a
/// signed 32-bit field, where -2^31 doesn't survive decoding.
pub fn is_encodable_delta(previous_delta: i64, delta: i64) -> bool {
  match delta.checked_sub(previous_delta) {
    Some(dod) => dod > i64::from(i32::MIN) && dod <= i64::from(i32::MAX),
    None => false,
  }
}

/// Check that the given sorted samples can be compressed into one block.
fn check_encodable(samples: &[Sample]) -> Result<(), ChunkError> {
  // The first sample is the encoder's start time, so the first delta follows a delta of 0.
  let mut previous_delta = 0;
  for pair in samples.windows(2) {
    let (previous, current) = (pair[0].get_timestamp(), pair[1].get_timestamp());
    let delta = current.checked_sub(previous);
    match delta {
      Some(delta) if is_encodable_delta(previous_delta, delta) => previous_delta = delta,
      _ => return Err(ChunkError::TimestampGapTooLarge(previous, current)),
    }
  }
  Ok(())
}

/// Compress a given Sample vector to a vector of u8 integers, using delta-of-delta compression.
pub fn compress_sample_vector(samples: &[Sample]) -> Result<Vec<u8>, ChunkError> {
  let start_sample = samples.first().ok_or(ChunkError::EmptyTimeSeriesBlock)?;
  check_encodable(samples)?;
  let start_time = start_sample.get_tsz_data_point().get_time();

  let w = BufferedWriter::new();
  let mut encoder = StdEncoder::new(start_time, w);
  for sample in samples {
    encoder.encode(sample.get_tsz_data_point());
  }

  let bytes = encoder.close();

  Ok(bytes.to_vec())
}
