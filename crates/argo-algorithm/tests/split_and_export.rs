//! End-to-end tests: explore, consolidate counterexamples, split the graph and
//! export the residual conditions to disk.

use std::{
    cell::Cell,
    fs,
    io::Read,
    num::NonZeroUsize,
    path::Path,
    rc::Rc,
};

use argo_algorithm::{
    Algorithm, AlgorithmError, AlgorithmStatus, Cancelled, FixedStatusAlgorithm,
    ShutdownNotifier, Statistics, StatisticsProvider, VerificationError,
    condition::{ConditionExporter, ConditionSink, ExportError, OutputPathTemplate},
    consolidation::{CounterexampleConsolidator, Feasibility, FeasibilityCheck, PathWitnessOracle},
    partitioning::{GraphPartitioner, PartitionerOptions, PartitioningState},
};
use argo_reachability_graph::{NodeId, ReachabilityGraph};
use flate2::read::GzDecoder;

/// `R -> A -> B` tagged 0 and `R -> C` tagged 1, `A` is a target
fn scenario_graph() -> ReachabilityGraph {
    let mut graph = ReachabilityGraph::new("R");
    let r = graph.root();
    let a = graph.add_child(r, "A").unwrap();
    let b = graph.add_child(a, "B").unwrap();
    let c = graph.add_child(r, "C").unwrap();
    graph.mark_target(a).unwrap();

    for (n, tag) in [(r, 0), (a, 0), (b, 0), (c, 1)] {
        graph.set_partition_tag(n, tag).unwrap();
    }
    graph
}

struct AlwaysFeasible;

impl FeasibilityCheck for AlwaysFeasible {
    fn check_path(
        &mut self,
        _graph: &ReachabilityGraph,
        _path: &[NodeId],
    ) -> Result<Feasibility, VerificationError> {
        Ok(Feasibility::Feasible)
    }
}

struct CountingSink(Rc<Cell<usize>>);

impl ConditionSink for CountingSink {
    fn write(&mut self, _path: &Path, _document: &str) -> Result<(), ExportError> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

fn read_gz(path: &Path) -> String {
    let mut content = String::new();
    GzDecoder::new(fs::File::open(path).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    content
}

#[test]
fn test_split_two_partitions_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("residual.%d.spc");

    let mut graph = scenario_graph();
    let consolidator = CounterexampleConsolidator::new(
        FixedStatusAlgorithm::new(AlgorithmStatus::SOUND_AND_PRECISE),
        PathWitnessOracle::new(AlwaysFeasible),
    );
    let mut partitioner = GraphPartitioner::new(
        consolidator,
        PartitionerOptions::new(NonZeroUsize::new(2).unwrap()),
    );

    let status = partitioner.run(&mut graph).unwrap();
    assert_eq!(status, AlgorithmStatus::SOUND_AND_IMPRECISE);
    assert_eq!(partitioner.state(), PartitioningState::Complete);

    let a = NodeId::new(1);
    let witness = graph.node(a).unwrap().witness().unwrap();
    assert!(witness.is_precise());
    assert_eq!(witness.path(), &[NodeId::new(0), a]);

    let partitions = partitioner.partitions().unwrap();
    assert_eq!(partitions[0].frontier(&graph), vec![NodeId::new(2)]);
    assert_eq!(partitions[1].frontier(&graph), vec![NodeId::new(3)]);

    let mut exporter =
        ConditionExporter::new(OutputPathTemplate::new(template.to_string_lossy()).unwrap());
    let report = partitioner.export_partitions(&graph, &mut exporter);

    assert!(report.is_success());
    assert_eq!(report.written.len(), 2);

    let first = read_gz(&dir.path().join("residual.0.spc.gz"));
    assert_eq!(
        first,
        "OBSERVER AUTOMATON ResidualCondition0\n\
         \n\
         INITIAL STATE ARG0;\n\
         \n\
         STATE USEFIRST ARG0 :\n    MATCH \"A\" -> GOTO ARG1;\n    TRUE -> STOP;\n\
         \n\
         STATE USEFIRST ARG1 :\n    MATCH \"B\" -> GOTO ARG2;\n    TRUE -> STOP;\n\
         \n\
         STATE USEFIRST ARG2 :\n    TRUE -> GOTO __TRUE;\n\
         \n\
         END AUTOMATON\n"
    );

    let second = read_gz(&dir.path().join("residual.1.spc.gz"));
    assert_eq!(
        second,
        "OBSERVER AUTOMATON ResidualCondition1\n\
         \n\
         INITIAL STATE ARG0;\n\
         \n\
         STATE USEFIRST ARG0 :\n    MATCH \"C\" -> GOTO ARG3;\n    TRUE -> STOP;\n\
         \n\
         STATE USEFIRST ARG3 :\n    TRUE -> GOTO __TRUE;\n\
         \n\
         END AUTOMATON\n"
    );

    let mut stats = Statistics::new();
    partitioner.collect_statistics(&mut stats);
    report.collect_statistics(&mut stats);
    let names = stats.iter().map(|(n, _)| n).collect::<Vec<_>>();
    assert_eq!(names.first(), Some(&"Number of target nodes"));
    assert!(names.contains(&"Number of splits"));
    assert!(names.contains(&"Number of exported conditions"));
}

#[test]
fn test_uncompressed_export() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("nested").join("residual.%d.spc");

    let mut graph = scenario_graph();
    let mut partitioner = GraphPartitioner::new(
        FixedStatusAlgorithm::new(AlgorithmStatus::SOUND_AND_PRECISE),
        PartitionerOptions::new(NonZeroUsize::new(2).unwrap()),
    );
    partitioner.run(&mut graph).unwrap();

    let mut exporter = ConditionExporter::new(
        OutputPathTemplate::new(template.to_string_lossy())
            .unwrap()
            .with_compression(false),
    );
    let report = partitioner.export_partitions(&graph, &mut exporter);

    assert!(report.is_success());
    let content = fs::read_to_string(dir.path().join("nested").join("residual.1.spc")).unwrap();
    assert!(content.starts_with("OBSERVER AUTOMATON ResidualCondition1\n"));
}

#[test]
fn test_export_after_cancellation_does_no_io() {
    let mut graph = scenario_graph();
    let notifier = ShutdownNotifier::new();
    notifier.request_shutdown("timeout");

    let mut partitioner = GraphPartitioner::new(
        FixedStatusAlgorithm::new(AlgorithmStatus::SOUND_AND_PRECISE),
        PartitionerOptions::new(NonZeroUsize::new(2).unwrap()),
    )
    .with_cancellation(notifier.clone());

    assert_eq!(
        partitioner.run(&mut graph),
        Err(AlgorithmError::Cancelled(Cancelled::new("timeout")))
    );
    assert_eq!(partitioner.state(), PartitioningState::Incomplete);

    let writes = Rc::new(Cell::new(0));
    let mut exporter = ConditionExporter::new(OutputPathTemplate::new("unused.%d").unwrap())
        .with_sink(CountingSink(writes.clone()));
    let report = partitioner.export_partitions(&graph, &mut exporter);

    assert!(report.skipped);
    assert_eq!(writes.get(), 0);
}

#[test]
fn test_failed_export_does_not_stop_other_partitions() {
    let dir = tempfile::tempdir().unwrap();
    // a directory occupies the path of partition 0
    fs::create_dir_all(dir.path().join("residual.0.spc")).unwrap();
    let template = dir.path().join("residual.%d.spc");

    let mut graph = scenario_graph();
    let mut partitioner = GraphPartitioner::new(
        FixedStatusAlgorithm::new(AlgorithmStatus::SOUND_AND_PRECISE),
        PartitionerOptions::new(NonZeroUsize::new(2).unwrap()),
    );
    partitioner.run(&mut graph).unwrap();

    let mut exporter = ConditionExporter::new(
        OutputPathTemplate::new(template.to_string_lossy())
            .unwrap()
            .with_compression(false),
    );
    let report = partitioner.export_partitions(&graph, &mut exporter);

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, 0);
    assert!(matches!(report.failures[0].1, ExportError::Io { .. }));
    assert_eq!(report.written.len(), 1);
    assert!(dir.path().join("residual.1.spc").is_file());
}
