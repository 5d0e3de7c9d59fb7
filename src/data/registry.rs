// ============================================================
// Layer 4 — Data Pipeline Registry
// ============================================================
// Resolves the data pipeline for a run from four names given on
// the command line:
//
//   --load-data-filename       module     (default "load_data")
//   --load-data-func-load      loader     (default "load_data")
//   --load-data-func-tokenized tokenizer  (default "tokenized_dataset")
//   --load-data-class          dataset    (default "RE_Dataset")
//
// The set of modules and callables is a closed, static table of
// function pointers. A typo in any name is reported before any
// data is read.
//
// Registered today:
//
//   load_data
//     loaders:    load_data (KLUE CSV), load_data_jsonl
//     tokenizers: tokenized_dataset (clue + sentence),
//                 tokenized_sentence (sentence only)
//     datasets:   RE_Dataset

use std::path::Path;

use tokenizers::Tokenizer;

use crate::data::{
    dataset::{build_relation_dataset, RelationDataset},
    loader::{load_jsonl, load_klue_csv},
    tokenize::{tokenize_pairs, tokenize_sentences, EncodedRelation, TokenizeOptions},
};
use crate::domain::{
    error::{DataError, RegistryError},
    relation::RelationRecord,
};

/// raw data path → records
pub type LoadFn = fn(&Path) -> Result<Vec<RelationRecord>, DataError>;

/// records + tokenizer + options → fixed-length features
pub type TokenizeFn =
    fn(&[RelationRecord], &Tokenizer, &TokenizeOptions) -> Result<Vec<EncodedRelation>, DataError>;

/// features + label indices → dataset
pub type DatasetFn = fn(Vec<EncodedRelation>, Vec<usize>) -> Result<RelationDataset, DataError>;

/// One named data module and the callables it exposes.
pub struct DataModule {
    pub name:       &'static str,
    pub loaders:    &'static [(&'static str, LoadFn)],
    pub tokenizers: &'static [(&'static str, TokenizeFn)],
    pub datasets:   &'static [(&'static str, DatasetFn)],
}

static MODULES: &[DataModule] = &[DataModule {
    name:       "load_data",
    loaders:    &[("load_data", load_klue_csv), ("load_data_jsonl", load_jsonl)],
    tokenizers: &[
        ("tokenized_dataset", tokenize_pairs),
        ("tokenized_sentence", tokenize_sentences),
    ],
    datasets:   &[("RE_Dataset", build_relation_dataset)],
}];

/// The names a run asks for.
#[derive(Debug, Clone)]
pub struct PipelineNames {
    pub module:    String,
    pub loader:    String,
    pub tokenizer: String,
    pub dataset:   String,
}

/// A fully resolved pipeline.
#[derive(Clone, Copy)]
pub struct DataPipeline {
    pub load:          LoadFn,
    pub tokenize:      TokenizeFn,
    pub build_dataset: DatasetFn,
}

impl std::fmt::Debug for DataPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPipeline").finish_non_exhaustive()
    }
}

fn lookup<F: Copy>(
    module: &DataModule,
    table:  &[(&'static str, F)],
    kind:   &'static str,
    name:   &str,
) -> Result<F, RegistryError> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
        .ok_or_else(|| RegistryError::UnknownFunction {
            module: module.name.to_string(),
            kind,
            name: name.to_string(),
        })
}

/// Resolve every name or fail on the first unknown one.
pub fn resolve(names: &PipelineNames) -> Result<DataPipeline, RegistryError> {
    let module = MODULES
        .iter()
        .find(|m| m.name == names.module)
        .ok_or_else(|| RegistryError::UnknownModule {
            name:  names.module.clone(),
            known: module_names().join(", "),
        })?;

    let pipeline = DataPipeline {
        load:          lookup(module, module.loaders, "loader", &names.loader)?,
        tokenize:      lookup(module, module.tokenizers, "tokenizer", &names.tokenizer)?,
        build_dataset: lookup(module, module.datasets, "dataset class", &names.dataset)?,
    };

    tracing::debug!(
        "Resolved data pipeline {}::{{{}, {}, {}}}",
        names.module, names.loader, names.tokenizer, names.dataset
    );
    Ok(pipeline)
}

/// Names of every registered module.
pub fn module_names() -> Vec<&'static str> {
    MODULES.iter().map(|m| m.name).collect()
}
