//! Residual conditions of partitions
//!
//! A residual condition describes the part of the program that is left for a
//! later, independent verification run of a single partition. It is derived
//! from the members of the partition and the frontier nodes, i.e. the members
//! at which exploration stopped.
//!
//! Exporting a condition involves three collaborators:
//! - a [`ConditionSerializer`] rendering the condition into a document,
//! - an [`OutputPathTemplate`] mapping the partition index to a path,
//! - a [`ConditionSink`] writing the document to that path.
//!
//! The default [`AutomatonConditionWriter`] renders the condition as an
//! observer automaton over the labels of the graph nodes:
//!
//! ```text
//! OBSERVER AUTOMATON ResidualCondition0
//!
//! INITIAL STATE ARG0;
//!
//! STATE USEFIRST ARG0 :
//!     MATCH "l1" -> GOTO ARG1;
//!     TRUE -> STOP;
//!
//! STATE USEFIRST ARG1 :
//!     TRUE -> GOTO __TRUE;
//!
//! END AUTOMATON
//! ```

use std::{
    collections::BTreeSet,
    error,
    fmt::{self, Write as _},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use argo_reachability_graph::{GraphError, NodeId, ReachabilityGraph};
use flate2::{Compression, write::GzEncoder};
use log::debug;

/// Placeholder for the partition index in an [`OutputPathTemplate`]
pub const INDEX_PLACEHOLDER: &str = "%d";

/// Extension appended to compressed output files
const GZ_EXTENSION: &str = ".gz";

/// Data describing the residual condition of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualCondition {
    /// Index of the partition
    index: usize,
    /// Root of the reachability graph
    root: NodeId,
    /// Members of the partition
    members: Vec<NodeId>,
    /// Members at which exploration stopped
    frontier: Vec<NodeId>,
}

impl ResidualCondition {
    /// Create a new residual condition
    pub fn new(index: usize, root: NodeId, members: Vec<NodeId>, frontier: Vec<NodeId>) -> Self {
        Self {
            index,
            root,
            members,
            frontier,
        }
    }

    /// Index of the partition the condition belongs to
    pub fn index(&self) -> usize {
        self.index
    }

    /// Root of the reachability graph
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Members of the partition
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Frontier nodes of the partition
    pub fn frontier(&self) -> &[NodeId] {
        &self.frontier
    }
}

/// Render a [`ResidualCondition`] into a document
pub trait ConditionSerializer {
    /// Serialize `condition`, which has been derived from `graph`
    fn serialize(
        &self,
        graph: &ReachabilityGraph,
        condition: &ResidualCondition,
    ) -> Result<String, ExportError>;
}

/// Serializer rendering a condition as an observer automaton
///
/// The automaton contains a state for every member of the partition and for
/// every node on the way from the root to a member. Frontier states accept
/// every continuation, transitions leaving the condition stop the run and
/// covered states continue at their coverer if it is part of the condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutomatonConditionWriter;

impl AutomatonConditionWriter {
    /// Collect the members and all of their ancestors
    fn states_of_condition(
        graph: &ReachabilityGraph,
        condition: &ResidualCondition,
    ) -> Result<BTreeSet<NodeId>, GraphError> {
        let mut states = BTreeSet::from([condition.root()]);
        let mut to_visit = condition.members().to_vec();

        while let Some(n) = to_visit.pop() {
            let node = graph.try_node(n)?;
            if states.insert(n) {
                to_visit.extend(node.parents());
            }
        }

        Ok(states)
    }

    fn escape_label(label: &str) -> String {
        label.replace('\\', "\\\\").replace('"', "\\\"")
    }
}

impl ConditionSerializer for AutomatonConditionWriter {
    fn serialize(
        &self,
        graph: &ReachabilityGraph,
        condition: &ResidualCondition,
    ) -> Result<String, ExportError> {
        let states = Self::states_of_condition(graph, condition)?;
        let frontier = condition.frontier().iter().collect::<BTreeSet<_>>();

        let mut doc = String::new();
        writeln!(doc, "OBSERVER AUTOMATON ResidualCondition{}", condition.index())?;
        writeln!(doc)?;
        writeln!(doc, "INITIAL STATE ARG{};", condition.root())?;
        writeln!(doc)?;

        for id in states.iter() {
            let node = graph.try_node(*id)?;
            writeln!(doc, "STATE USEFIRST ARG{id} :")?;

            if frontier.contains(id) {
                writeln!(doc, "    TRUE -> GOTO __TRUE;")?;
            } else if let Some(coverer) = node.covered_by() {
                if states.contains(&coverer) {
                    writeln!(doc, "    TRUE -> GOTO ARG{coverer};")?;
                } else {
                    writeln!(doc, "    TRUE -> STOP;")?;
                }
            } else {
                for child in node.children().filter(|c| states.contains(c)) {
                    let label = Self::escape_label(graph.try_node(child)?.label());
                    writeln!(doc, "    MATCH \"{label}\" -> GOTO ARG{child};")?;
                }
                writeln!(doc, "    TRUE -> STOP;")?;
            }

            writeln!(doc)?;
        }

        writeln!(doc, "END AUTOMATON")?;

        debug!(
            "Serialized residual condition {} with {} states",
            condition.index(),
            states.len()
        );

        Ok(doc)
    }
}

/// Template mapping a partition index to an output path
///
/// The template must contain the placeholder `%d` exactly once, it is
/// replaced by the index of the partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPathTemplate {
    template: String,
    compress: bool,
}

impl OutputPathTemplate {
    /// Create a new template, output will be compressed
    pub fn new<S: Into<String>>(template: S) -> Result<Self, ExportError> {
        let template = template.into();

        if template.matches(INDEX_PLACEHOLDER).count() != 1 {
            return Err(ExportError::InvalidTemplate(template));
        }

        Ok(Self {
            template,
            compress: true,
        })
    }

    /// Enable or disable compression of the output
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Whether the output will be compressed
    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Compute the output path for the partition with index `index`
    ///
    /// If compression is enabled, `.gz` is appended unless the template
    /// already ends with it.
    pub fn path_for(&self, index: usize) -> PathBuf {
        let mut path = self
            .template
            .replace(INDEX_PLACEHOLDER, &index.to_string());

        if self.compress && !path.ends_with(GZ_EXTENSION) {
            path += GZ_EXTENSION;
        }

        PathBuf::from(path)
    }
}

impl fmt::Display for OutputPathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template)
    }
}

/// Destination for serialized conditions
pub trait ConditionSink {
    /// Write `document` to `path`
    fn write(&mut self, path: &Path, document: &str) -> Result<(), ExportError>;
}

/// Sink writing documents to the file system
///
/// Paths ending in `.gz` are written gzip compressed. Missing parent
/// directories are created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileConditionSink;

impl FileConditionSink {
    fn write_to_file(path: &Path, document: &str) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(path)?;

        if path.to_string_lossy().ends_with(GZ_EXTENSION) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(document.as_bytes())?;
            encoder.finish()?;
            return Ok(());
        }

        let mut file = io::BufWriter::new(file);
        file.write_all(document.as_bytes())?;
        file.flush()
    }
}

impl ConditionSink for FileConditionSink {
    fn write(&mut self, path: &Path, document: &str) -> Result<(), ExportError> {
        Self::write_to_file(path, document).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Bundle of the collaborators needed to export residual conditions
pub struct ConditionExporter {
    serializer: Box<dyn ConditionSerializer>,
    template: OutputPathTemplate,
    sink: Box<dyn ConditionSink>,
}

impl ConditionExporter {
    /// Create an exporter writing automata to files according to `template`
    pub fn new(template: OutputPathTemplate) -> Self {
        Self {
            serializer: Box::new(AutomatonConditionWriter),
            template,
            sink: Box::new(FileConditionSink),
        }
    }

    /// Replace the serializer
    pub fn with_serializer<S: ConditionSerializer + 'static>(mut self, serializer: S) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    /// Replace the sink
    pub fn with_sink<S: ConditionSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Template used to compute output paths
    pub fn template(&self) -> &OutputPathTemplate {
        &self.template
    }

    /// Serialize `condition` and write it to the path of its partition
    ///
    /// Returns the path the document has been written to.
    pub fn export(
        &mut self,
        graph: &ReachabilityGraph,
        condition: &ResidualCondition,
    ) -> Result<PathBuf, ExportError> {
        let document = self.serializer.serialize(graph, condition)?;
        let path = self.template.path_for(condition.index());
        self.sink.write(&path, &document)?;
        Ok(path)
    }
}

/// Errors that can occur while exporting a residual condition
#[derive(Debug)]
pub enum ExportError {
    /// Writing the document failed
    Io {
        /// Path that could not be written
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// The condition could not be rendered
    Serialization(String),
    /// The condition refers to nodes not contained in the graph
    Graph(GraphError),
    /// The output path template does not contain exactly one placeholder
    InvalidTemplate(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io { path, source } => {
                write!(f, "Failed to write '{}': {source}", path.display())
            }
            ExportError::Serialization(msg) => {
                write!(f, "Failed to serialize residual condition: {msg}")
            }
            ExportError::Graph(e) => write!(f, "Residual condition is inconsistent: {e}"),
            ExportError::InvalidTemplate(t) => write!(
                f,
                "Output path template '{t}' must contain the placeholder '{INDEX_PLACEHOLDER}' exactly once"
            ),
        }
    }
}

impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ExportError::Io { source, .. } => Some(source),
            ExportError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for ExportError {
    fn from(value: GraphError) -> Self {
        ExportError::Graph(value)
    }
}

impl From<fmt::Error> for ExportError {
    fn from(value: fmt::Error) -> Self {
        ExportError::Serialization(value.to_string())
    }
}
