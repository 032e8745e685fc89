use crate::error::EvoError;
use crate::evolution::{EvolutionEngine, LineageRecord};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

type Node = usize; // Individual ID
type Edge = (usize, usize); // (ParentID, ChildID)

/// Parent → child graph of every recorded birth.
pub struct PhylogenyGraph {
    generations: BTreeMap<Node, u32>,
    edges: Vec<Edge>,
}

impl PhylogenyGraph {
    pub fn from_records(records: &[LineageRecord]) -> Self {
        let mut generations = BTreeMap::new();
        let mut edges = Vec::new();
        for record in records {
            generations.insert(record.child, record.generation);
            if let Some((parent1, parent2)) = record.parents {
                edges.push((parent1, record.child));
                // Selfing records a single edge.
                if parent2 != parent1 {
                    edges.push((parent2, record.child));
                }
            }
        }
        for &(parent, _) in &edges {
            generations.entry(parent).or_insert(0);
        }
        Self { generations, edges }
    }

    pub fn render<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        dot::render(self, out)
    }
}

fn id<'a>(name: String) -> dot::Id<'a> {
    dot::Id::new(name).expect("generated ids are alphanumeric")
}

impl<'a> dot::Labeller<'a, Node, Edge> for PhylogenyGraph {
    fn graph_id(&'a self) -> dot::Id<'a> {
        id("phylogeny".to_string())
    }

    fn node_id(&'a self, n: &Node) -> dot::Id<'a> {
        id(format!("n{}", n))
    }

    fn node_label(&'a self, n: &Node) -> dot::LabelText<'a> {
        let generation = self.generations.get(n).copied().unwrap_or_default();
        dot::LabelText::LabelStr(Cow::Owned(format!("#{} gen {}", n, generation)))
    }
}

impl<'a> dot::GraphWalk<'a, Node, Edge> for PhylogenyGraph {
    fn nodes(&'a self) -> dot::Nodes<'a, Node> {
        Cow::Owned(self.generations.keys().copied().collect())
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge> {
        Cow::Borrowed(self.edges.as_slice())
    }

    fn source(&'a self, e: &Edge) -> Node {
        e.0
    }

    fn target(&'a self, e: &Edge) -> Node {
        e.1
    }
}

// Writes the engine's lineage as a Graphviz DOT file
pub fn write_phylogeny_to_dot_file(engine: &EvolutionEngine, path: &Path) -> Result<(), EvoError> {
    let graph = PhylogenyGraph::from_records(&engine.phylogeny_data);
    let mut file = BufWriter::new(File::create(path)?);
    graph.render(&mut file)?;
    file.flush()?;
    info!(path = %path.display(), individuals = graph.generations.len(), "phylogeny DOT file written");
    Ok(())
}
