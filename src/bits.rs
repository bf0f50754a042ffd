//! Bit-exact float encoding for persisted state
//!
//! Checkpoints must restore accumulators that continue exactly as if they
//! had never stopped, and accumulator state routinely contains NaN markers
//! that JSON cannot represent. Every persisted `f64` is therefore written as
//! its IEEE-754 bit pattern.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single `f64`, stored as `u64` bits.
pub(crate) mod float {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

/// A `Vec<f64>`, stored as a sequence of `u64` bits.
pub(crate) mod f64_vec {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.to_bits()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let bits = Vec::<u64>::deserialize(deserializer)?;
        Ok(bits.into_iter().map(f64::from_bits).collect())
    }
}

#[derive(Serialize, Deserialize)]
struct EncodedArray {
    shape: Vec<usize>,
    #[serde(with = "f64_vec")]
    data: Vec<f64>,
}

/// An `ArrayD<f64>`, stored as its shape plus logical-order bits.
pub(crate) mod array {
    use super::*;

    pub fn serialize<S: Serializer>(array: &ArrayD<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        EncodedArray {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ArrayD<f64>, D::Error> {
        let encoded = EncodedArray::deserialize(deserializer)?;
        ArrayD::from_shape_vec(IxDyn(&encoded.shape), encoded.data)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Debug)]
    struct Persisted {
        #[serde(with = "float")]
        scalar: f64,
        #[serde(with = "f64_vec")]
        values: Vec<f64>,
        #[serde(with = "array")]
        field: ArrayD<f64>,
    }

    #[test]
    fn test_non_finite_values_survive_json() {
        let persisted = Persisted {
            scalar: f64::NAN,
            values: vec![f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.1 + 0.2],
            field: ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![f64::NAN, 1e-310]).unwrap(),
        };
        let json = serde_json::to_string(&persisted).unwrap();
        let back: Persisted = serde_json::from_str(&json).unwrap();

        assert!(back.scalar.is_nan());
        let bits: Vec<u64> = back.values.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u64> = persisted.values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
        assert_eq!(back.field.shape(), &[2, 1]);
        assert!(back.field[[0, 0]].is_nan());
        assert_eq!(back.field[[1, 0]].to_bits(), 1e-310f64.to_bits());
    }

    #[test]
    fn test_bad_shape_is_rejected() {
        let json = r#"{"scalar":0,"values":[],"field":{"shape":[3],"data":[0]}}"#;
        assert!(serde_json::from_str::<Persisted>(json).is_err());
    }
}
