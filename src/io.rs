//! Model artifacts: compact JSON exports and the sparse binary parser
//! model (format v1.1).
//!
//! The binary layout is a 64-byte little-endian header followed by the
//! payload `metadata JSON || feature index || sparse weights`, where the
//! feature index is a sequence of null-terminated UTF-8 keys (bucket ids
//! in decimal) and each weight record is a `u16` count followed by
//! `count` pairs of `u16` transition index and `f32` weight. The header
//! carries a SHA-256 digest of the payload that readers must verify.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::hashing::HashedModel;
use crate::perceptron::{FrozenWeights, Scorer};
use crate::util::round_to;

pub const MAGIC: &[u8; 4] = b"TT01";
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 1;
const ENDIAN_LITTLE: u8 = 0x00;
const MODEL_TYPE_PARSER: u8 = 0x02;
const HEADER_LEN: usize = 64;

pub const POS_WEIGHTS_FILE: &str = "pos-weights.json";
pub const POS_WEIGHTS_PRUNED_FILE: &str = "pos-weights-pruned.json";
pub const DEP_WEIGHTS_FILE: &str = "dep-weights.json";
pub const DEP_WEIGHTS_PRUNED_FILE: &str = "dep-weights-pruned.json";
pub const DEP_WEIGHTS_BINARY_FILE: &str = "dep-weights-pruned.bin";
pub const DEP_CALIBRATION_FILE: &str = "dep-calibration.json";

/// Provenance block of the POS artifacts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosProvenance {
    pub script_version: String,
    pub git_commit: String,
    pub corpus_version: String,
    pub trained_date: String,
    pub license: String,
    pub seed: u64,
    pub iterations: u32,
    pub dev_accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_prune_dev_accuracy: Option<f64>,
}

/// Provenance block of the parser artifacts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserProvenance {
    pub script_version: String,
    pub git_commit: String,
    pub corpus_version: String,
    pub trained_date: String,
    pub license: String,
    pub seed: u64,
    pub iterations: u32,
    pub uas: f64,
    pub las: f64,
    pub dev_uas: f64,
    pub dev_las: f64,
    pub non_projective_sentence_rate: f64,
    pub non_projective_arc_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hash_uas: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hash_las: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune_threshold: Option<f64>,
}

/// The POS model artifact (full or pruned).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosModel {
    pub version: String,
    pub tagset: String,
    pub trained_on: String,
    pub provenance: PosProvenance,
    pub classes: Vec<String>,
    pub tagdict: BTreeMap<String, String>,
    pub weights: BTreeMap<String, BTreeMap<String, f64>>,
}

/// The full (debug) parser artifact, keyed by feature strings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserModelFull {
    pub version: String,
    pub trained_on: String,
    pub provenance: ParserProvenance,
    pub labels: Vec<String>,
    pub transitions: Vec<String>,
    pub weights: BTreeMap<String, BTreeMap<String, f64>>,
}

/// The production parser artifact, keyed by bucket ids in decimal.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserModelPruned {
    pub version: String,
    pub trained_on: String,
    pub provenance: ParserProvenance,
    pub labels: Vec<String>,
    pub transitions: Vec<String>,
    pub num_buckets: u32,
    pub weights: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Binary-independent metadata written into the binary payload: the
/// pruned artifact minus its weights.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryMetadata {
    pub version: String,
    pub trained_on: String,
    pub provenance: ParserProvenance,
    pub labels: Vec<String>,
    pub transitions: Vec<String>,
    pub num_buckets: u32,
}

/// Frozen weights as `feature -> class name -> weight`, rounded to
/// `places` decimals with zero entries dropped.
pub fn named_weights(
    frozen: &FrozenWeights,
    classes: &[String],
    places: i32,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut named = BTreeMap::new();
    for (feature, row) in &frozen.weights {
        let mut out = BTreeMap::new();
        for (&class, &weight) in row {
            let rounded = round_to(weight, places);
            if rounded != 0.0 {
                out.insert(classes[class].clone(), rounded);
            }
        }
        if !out.is_empty() {
            named.insert(feature.clone(), out);
        }
    }
    named
}

/// Hashed weights as `bucket (decimal) -> transition name -> weight`.
pub fn bucket_weights(
    model: &HashedModel,
    transitions: &[String],
) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut named = BTreeMap::new();
    for (bucket, row) in model.buckets() {
        let out: BTreeMap<String, f64> = row
            .iter()
            .map(|(&class, &weight)| (transitions[class as usize].clone(), weight))
            .collect();
        named.insert(bucket.to_string(), out);
    }
    named
}

/// Write a compact JSON artifact and return its size in bytes.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<u64> {
    let file =
        File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Cannot serialize {}", path.display()))?;
    writer.flush()?;

    Ok(path.metadata()?.len())
}

pub fn read_parser_model_full(path: &Path) -> Result<ParserModelFull> {
    let file = File::open(path).with_context(|| {
        format!(
            "Cannot open {} (train the full model before post-processing)",
            path.display()
        )
    })?;
    serde_json::from_reader(file).with_context(|| format!("Cannot parse {}", path.display()))
}

/// Binary serialization of a hashed model.
pub trait WriteModelBinary<W>
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W, metadata: &[u8]) -> Result<()>;
}

impl<W> WriteModelBinary<W> for HashedModel
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W, metadata: &[u8]) -> Result<()> {
        let mut index = Vec::new();
        let mut weight_data = Vec::new();
        let mut total_entries = 0u32;

        for (bucket, row) in self.buckets() {
            index.extend_from_slice(bucket.to_string().as_bytes());
            index.push(0);

            ensure!(row.len() <= u16::MAX as usize, "weight row too large");
            weight_data.write_u16::<LittleEndian>(row.len() as u16)?;
            for (&class, &weight) in row {
                weight_data.write_u16::<LittleEndian>(class)?;
                weight_data.write_f32::<LittleEndian>(weight as f32)?;
            }
            total_entries += row.len() as u32;
        }

        let mut digest = Sha256::new();
        digest.update(metadata);
        digest.update(&index);
        digest.update(&weight_data);
        let checksum = digest.finalize();

        write.write_all(MAGIC)?;
        write.write_u8(VERSION_MAJOR)?;
        write.write_u8(VERSION_MINOR)?;
        write.write_u8(ENDIAN_LITTLE)?;
        write.write_u8(MODEL_TYPE_PARSER)?;
        write.write_u32::<LittleEndian>(self.n_buckets_used() as u32)?;
        write.write_u32::<LittleEndian>(self.n_classes() as u32)?;
        write.write_u32::<LittleEndian>(total_entries)?;
        write.write_u32::<LittleEndian>(metadata.len() as u32)?;
        write.write_u32::<LittleEndian>(index.len() as u32)?;
        write.write_u32::<LittleEndian>(weight_data.len() as u32)?;
        write.write_all(&checksum)?;

        write.write_all(metadata)?;
        write.write_all(&index)?;
        write.write_all(&weight_data)?;

        Ok(())
    }
}

/// A binary model read back from disk.
#[derive(Debug)]
pub struct BinaryModel {
    pub metadata: serde_json::Value,
    pub transition_count: usize,
    pub weights: BTreeMap<u32, BTreeMap<u16, f32>>,
}

/// Read and verify a binary parser model.
///
/// A checksum mismatch is fatal: the file is rejected rather than
/// partially decoded.
pub fn read_model_binary<R>(read: &mut R) -> Result<BinaryModel>
where
    R: Read,
{
    let mut magic = [0u8; 4];
    read.read_exact(&mut magic)?;
    ensure!(&magic == MAGIC, "bad magic: {:?}", magic);

    let major = read.read_u8()?;
    let minor = read.read_u8()?;
    ensure!(
        major == VERSION_MAJOR && minor == VERSION_MINOR,
        "unsupported model version {}.{}",
        major,
        minor
    );
    ensure!(read.read_u8()? == ENDIAN_LITTLE, "unsupported endianness");
    ensure!(read.read_u8()? == MODEL_TYPE_PARSER, "unsupported model type");

    let feature_count = read.read_u32::<LittleEndian>()? as usize;
    let transition_count = read.read_u32::<LittleEndian>()? as usize;
    let total_entries = read.read_u32::<LittleEndian>()? as usize;
    let metadata_len = read.read_u32::<LittleEndian>()? as usize;
    let index_len = read.read_u32::<LittleEndian>()? as usize;
    let weight_len = read.read_u32::<LittleEndian>()? as usize;

    let mut checksum = [0u8; 32];
    read.read_exact(&mut checksum)?;

    let mut payload = vec![0u8; metadata_len + index_len + weight_len];
    read.read_exact(&mut payload)?;

    let mut digest = Sha256::new();
    digest.update(&payload);
    ensure!(
        digest.finalize().as_slice() == checksum,
        "payload checksum mismatch"
    );

    let metadata: serde_json::Value = serde_json::from_slice(&payload[..metadata_len])
        .context("Cannot parse model metadata")?;

    let index = &payload[metadata_len..metadata_len + index_len];
    let keys: Vec<&str> = if index.is_empty() {
        Vec::new()
    } else {
        ensure!(
            index.last() == Some(&0),
            "feature index is not null-terminated"
        );
        index[..index.len() - 1]
            .split(|&b| b == 0)
            .map(|key| std::str::from_utf8(key).context("feature key is not UTF-8"))
            .collect::<Result<_>>()?
    };
    ensure!(
        keys.len() == feature_count,
        "feature index has {} keys, header says {}",
        keys.len(),
        feature_count
    );

    let mut weight_read = &payload[metadata_len + index_len..];
    let mut weights = BTreeMap::new();
    let mut seen_entries = 0usize;
    for key in keys {
        let bucket: u32 = key
            .parse()
            .with_context(|| format!("feature key {:?} is not a bucket id", key))?;
        let count = weight_read.read_u16::<LittleEndian>()? as usize;
        let mut row = BTreeMap::new();
        for _ in 0..count {
            let class = weight_read.read_u16::<LittleEndian>()?;
            let weight = weight_read.read_f32::<LittleEndian>()?;
            ensure!(
                (class as usize) < transition_count,
                "transition index {} out of range",
                class
            );
            row.insert(class, weight);
        }
        seen_entries += count;
        weights.insert(bucket, row);
    }
    ensure!(
        seen_entries == total_entries,
        "weight data has {} entries, header says {}",
        seen_entries,
        total_entries
    );
    if !weight_read.is_empty() {
        bail!("trailing bytes after weight data");
    }

    Ok(BinaryModel {
        metadata,
        transition_count,
        weights,
    })
}

pub fn read_model_binary_file(path: &Path) -> Result<BinaryModel> {
    let mut file =
        File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    read_model_binary(&mut file)
}
