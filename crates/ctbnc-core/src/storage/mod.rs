//! CSV dataset loading.
//!
//! Each CSV document is one trajectory:
//!
//! ```text
//! t,class,x,y
//! 0.0,sick,low,off
//! 0.7,,high,
//! 1.3,,,on
//! ```
//!
//! - the first line is the header; the time column is excluded from the
//!   indexing and the optional class column is marked as the class variable
//! - every following non-empty line is one transition
//! - an empty cell means "unchanged since the previous row"
//! - state names are discovered per column in first-seen order
//!
//! All documents of a dataset must share one header. A second dataset (for
//! example held-out test data) can be loaded against an existing one with
//! [`Dataset::load_compatible`], which reuses its indexing and state lists.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::engine::errors::CtbnError;
use crate::engine::indexing::{IndexingRegistry, NodeId, NodeIndexing};
use crate::engine::model::CtbnModel;
use crate::engine::node::RESERVED_STATE_CHARS;
use crate::engine::trajectory::Trajectory;

/// Column roles and delimiter of a CSV dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CsvLayout {
    pub time_column: String,
    pub class_column: Option<String>,
    pub delimiter: char,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            time_column: "t".into(),
            class_column: Some("class".into()),
            delimiter: ',',
        }
    }
}

impl CsvLayout {
    pub fn validate(&self) -> Result<(), CtbnError> {
        if self.time_column.is_empty() {
            return Err(CtbnError::Construction("csv: time column name is empty".into()));
        }
        if matches!(self.delimiter, '"' | '\r' | '\n') {
            return Err(CtbnError::Construction(format!(
                "csv: {:?} cannot be used as delimiter",
                self.delimiter
            )));
        }
        Ok(())
    }
}

/// Trajectories loaded from CSV together with the discovered state sets.
#[derive(Debug, Clone)]
pub struct Dataset {
    indexing: Arc<NodeIndexing>,
    states: Vec<Vec<String>>,
    trajectories: Vec<Trajectory>,
    names: Vec<String>,
}

impl Dataset {
    pub fn indexing(&self) -> &Arc<NodeIndexing> {
        &self.indexing
    }

    /// `states()[i]` are the states of variable `i`, in index order.
    pub fn states(&self) -> &[Vec<String>] {
        &self.states
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    /// Document name per trajectory.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn class_states(&self) -> Option<&[String]> {
        self.indexing
            .class_id()
            .map(|id| self.states[id.index()].as_slice())
    }

    /// Class state of each trajectory's first row (`None` when unlabeled).
    pub fn class_labels(&self) -> Vec<Option<usize>> {
        let class = self.indexing.class_id();
        self.trajectories
            .iter()
            .map(|t| class.and_then(|id| t.transitions()[0].value(id)))
            .collect()
    }

    /// Class-rooted naive Bayes skeleton over every variable.
    pub fn naive_bayes_model(&self, name: &str) -> Result<CtbnModel, CtbnError> {
        CtbnModel::naive_bayes(Arc::clone(&self.indexing), name, &self.states)
    }

    /// Loads more documents against this dataset's indexing and states.
    /// A state not seen in this dataset is a data error.
    pub fn load_compatible<'a>(
        &self,
        documents: impl IntoIterator<Item = (&'a str, &'a str)>,
        layout: &CsvLayout,
    ) -> Result<Dataset, CtbnError> {
        layout.validate()?;
        let mut states = StateTable::frozen(&self.states);
        let mut trajectories = Vec::new();
        let mut names = Vec::new();
        for (name, text) in documents {
            let doc = parse_document(name, text, layout)?;
            if doc.variables != self.indexing.names() {
                return Err(CtbnError::Construction(format!(
                    "csv '{}': header does not match indexing '{}'",
                    name,
                    self.indexing.name()
                )));
            }
            trajectories.push(doc.into_trajectory(&self.indexing, &mut states)?);
            names.push(name.to_string());
        }
        debug!(
            indexing = self.indexing.name(),
            trajectories = trajectories.len(),
            "loaded compatible csv dataset"
        );
        Ok(Dataset {
            indexing: Arc::clone(&self.indexing),
            states: self.states.clone(),
            trajectories,
            names,
        })
    }
}

/// Loads named CSV documents into a dataset, registering its indexing as
/// `indexing_name` in `registry`.
pub fn load_csv_dataset<'a>(
    registry: &IndexingRegistry,
    indexing_name: &str,
    documents: impl IntoIterator<Item = (&'a str, &'a str)>,
    layout: &CsvLayout,
) -> Result<Dataset, CtbnError> {
    layout.validate()?;
    let docs = documents
        .into_iter()
        .map(|(name, text)| parse_document(name, text, layout).map(|doc| (name, doc)))
        .collect::<Result<Vec<_>, _>>()?;
    let (first_name, first) = docs.first().ok_or_else(|| {
        CtbnError::DataConsistency("csv dataset contains no documents".into())
    })?;
    for (name, doc) in &docs[1..] {
        if doc.variables != first.variables {
            return Err(CtbnError::Construction(format!(
                "csv '{}': header differs from '{}'",
                name, first_name
            )));
        }
    }

    let indexing = registry.get_or_create(indexing_name, || {
        NodeIndexing::new(
            indexing_name,
            first.variables.iter().map(String::as_str),
            layout.class_column.as_deref(),
        )
    })?;
    if indexing.names() != first.variables.as_slice() {
        return Err(CtbnError::Construction(format!(
            "indexing '{}' is already registered with different variables",
            indexing_name
        )));
    }

    let mut states = StateTable::growing(indexing.len());
    let mut trajectories = Vec::with_capacity(docs.len());
    let mut names = Vec::with_capacity(docs.len());
    for (name, doc) in docs {
        trajectories.push(doc.into_trajectory(&indexing, &mut states)?);
        names.push(name.to_string());
    }
    debug!(
        indexing = indexing_name,
        trajectories = trajectories.len(),
        "loaded csv dataset"
    );
    Ok(Dataset {
        indexing,
        states: states.into_states(),
        trajectories,
        names,
    })
}

/// Reads files into `(name, contents)` pairs for the loaders above.
pub fn read_csv_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<(String, String)>, CtbnError> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let text = fs::read_to_string(path)?;
            Ok((path.display().to_string(), text))
        })
        .collect()
}

/// One parsed CSV document before state names are resolved.
struct ParsedDocument<'a> {
    name: &'a str,
    variables: Vec<String>,
    times: Vec<f64>,
    cells: Vec<Vec<&'a str>>,
}

fn parse_document<'a>(
    name: &'a str,
    text: &'a str,
    layout: &CsvLayout,
) -> Result<ParsedDocument<'a>, CtbnError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| CtbnError::Construction(format!("csv '{}': missing header", name)))?;
    let header: Vec<&str> = header.split(layout.delimiter).map(str::trim).collect();
    let time_col = header
        .iter()
        .position(|h| *h == layout.time_column)
        .ok_or_else(|| {
            CtbnError::Construction(format!(
                "csv '{}': time column '{}' not found",
                name, layout.time_column
            ))
        })?;
    let variables: Vec<String> = header
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != time_col)
        .map(|(_, h)| h.to_string())
        .collect();
    if let Some((i, dup)) = variables
        .iter()
        .enumerate()
        .find(|(i, v)| variables[..*i].contains(v))
    {
        return Err(CtbnError::Construction(format!(
            "csv '{}': column '{}' appears more than once (position {})",
            name, dup, i
        )));
    }
    if let Some(class) = &layout.class_column {
        if !variables.contains(class) {
            return Err(CtbnError::Construction(format!(
                "csv '{}': class column '{}' not found",
                name, class
            )));
        }
    }

    let mut times = Vec::new();
    let mut cells = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split(layout.delimiter).map(str::trim).collect();
        if fields.len() != header.len() {
            return Err(CtbnError::Construction(format!(
                "csv '{}' line {}: expected {} fields, found {}",
                name,
                line_no + 1,
                header.len(),
                fields.len()
            )));
        }
        let time: f64 = fields[time_col].parse().map_err(|_| {
            CtbnError::Construction(format!(
                "csv '{}' line {}: invalid time '{}'",
                name,
                line_no + 1,
                fields[time_col]
            ))
        })?;
        if !time.is_finite() {
            return Err(CtbnError::Construction(format!(
                "csv '{}' line {}: time must be finite",
                name,
                line_no + 1
            )));
        }
        if let Some(bad) = fields.iter().find(|f| f.contains(RESERVED_STATE_CHARS)) {
            return Err(CtbnError::Construction(format!(
                "csv '{}' line {}: state '{}' contains a reserved character",
                name,
                line_no + 1,
                bad
            )));
        }
        times.push(time);
        cells.push(
            fields
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != time_col)
                .map(|(_, f)| *f)
                .collect(),
        );
    }
    Ok(ParsedDocument {
        name,
        variables,
        times,
        cells,
    })
}

impl ParsedDocument<'_> {
    fn into_trajectory(
        self,
        indexing: &Arc<NodeIndexing>,
        states: &mut StateTable,
    ) -> Result<Trajectory, CtbnError> {
        let mut values = Vec::with_capacity(self.cells.len());
        for row in &self.cells {
            let mut resolved = Vec::with_capacity(row.len());
            for (i, cell) in row.iter().enumerate() {
                resolved.push(if cell.is_empty() {
                    None
                } else {
                    Some(states.resolve(NodeId(i as u32), cell, self.name)?)
                });
            }
            values.push(resolved);
        }
        Trajectory::new(Arc::clone(indexing), self.times, values).map_err(|err| match err {
            CtbnError::Construction(msg) => {
                CtbnError::Construction(format!("csv '{}': {}", self.name, msg))
            }
            other => other,
        })
    }
}

/// Per-column state lists; either growing (first load) or frozen.
struct StateTable {
    states: Vec<Vec<String>>,
    lookup: Vec<FxHashMap<String, usize>>,
    frozen: bool,
}

impl StateTable {
    fn growing(width: usize) -> Self {
        Self {
            states: vec![Vec::new(); width],
            lookup: vec![FxHashMap::default(); width],
            frozen: false,
        }
    }

    fn frozen(states: &[Vec<String>]) -> Self {
        let lookup = states
            .iter()
            .map(|col| col.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect())
            .collect();
        Self {
            states: states.to_vec(),
            lookup,
            frozen: true,
        }
    }

    fn resolve(&mut self, column: NodeId, cell: &str, document: &str) -> Result<usize, CtbnError> {
        let col = column.index();
        if let Some(&index) = self.lookup[col].get(cell) {
            return Ok(index);
        }
        if self.frozen {
            return Err(CtbnError::DataConsistency(format!(
                "csv '{}': state '{}' of column {} was not seen in the reference dataset",
                document, cell, column
            )));
        }
        let index = self.states[col].len();
        self.states[col].push(cell.to_string());
        self.lookup[col].insert(cell.to_string(), index);
        Ok(index)
    }

    fn into_states(self) -> Vec<Vec<String>> {
        self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN_A: &str = "t,class,x\n0.0,a,low\n1.0,,high\n2.5,,low\n";
    const TRAIN_B: &str = "t,class,x\n0.0,b,high\n\n0.5,,low\n";

    #[test]
    fn loads_sparse_cells_and_discovers_states() {
        let registry = IndexingRegistry::new();
        let ds = load_csv_dataset(
            &registry,
            "train",
            [("a.csv", TRAIN_A), ("b.csv", TRAIN_B)],
            &CsvLayout::default(),
        )
        .expect("dataset");

        assert_eq!(ds.indexing().names(), &["class", "x"]);
        assert_eq!(ds.states()[0], vec!["a", "b"]);
        assert_eq!(ds.states()[1], vec!["low", "high"]);
        assert_eq!(ds.class_labels(), vec![Some(0), Some(1)]);
        let second = &ds.trajectories()[0].transitions()[1];
        assert_eq!(second.values(), &[None, Some(1)]);
        assert_eq!(ds.trajectories()[1].len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn compatible_load_reuses_states() {
        let registry = IndexingRegistry::new();
        let train =
            load_csv_dataset(&registry, "ds", [("a.csv", TRAIN_A)], &CsvLayout::default())
                .expect("train");
        let test = train
            .load_compatible([("t.csv", "t,class,x\n0,,high\n1,,low\n")], &CsvLayout::default())
            .expect("test");
        assert_eq!(test.class_labels(), vec![None]);
        assert_eq!(test.trajectories()[0].transitions()[0].values(), &[None, Some(1)]);

        let err = train
            .load_compatible([("u.csv", "t,class,x\n0,,medium\n")], &CsvLayout::default())
            .expect_err("unknown state");
        assert!(matches!(err, CtbnError::DataConsistency(_)));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let registry = IndexingRegistry::new();
        let layout = CsvLayout::default();
        let cases = [
            "time,class,x\n0,a,low\n",
            "t,class,x\n0,a\n",
            "t,class,x\nnope,a,low\n",
            "t,class,x\ninf,a,low\n",
            "t,x\n0,low\n",
        ];
        for (i, text) in cases.iter().enumerate() {
            let name = format!("bad{}", i);
            let err = load_csv_dataset(&registry, &name, [("bad.csv", *text)], &layout)
                .expect_err("malformed");
            assert!(matches!(err, CtbnError::Construction(_)), "case {}: {}", i, err);
        }
    }

    #[test]
    fn headers_must_match_across_documents() {
        let registry = IndexingRegistry::new();
        let err = load_csv_dataset(
            &registry,
            "mixed",
            [("a.csv", TRAIN_A), ("c.csv", "t,class,y\n0,a,low\n")],
            &CsvLayout::default(),
        )
        .expect_err("mismatch");
        assert!(err.to_string().contains("header differs"));
    }

    #[test]
    fn naive_bayes_model_covers_every_variable() {
        let registry = IndexingRegistry::new();
        let ds = load_csv_dataset(&registry, "nb", [("a.csv", TRAIN_A)], &CsvLayout::default())
            .expect("dataset");
        let model = ds.naive_bayes_model("nb").expect("model");
        assert_eq!(model.len(), 2);
        assert!(model.class_node().expect("class").is_static());
    }
}
