// src/rules/dag.rs

//! The job DAG produced by the extractor.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::CompileError;
use crate::rules::handle::FileHandle;
use crate::rules::job::{Job, JobId};

/// Immutable DAG of jobs.
///
/// Edges come only from path identity: job B depends on job A iff one of
/// A's outputs/logs equals one of B's inputs. Construction rejects cycles,
/// so every `JobDag` in existence is acyclic.
///
/// Several jobs producing the same path are tolerated here (they all become
/// upstream of the consumer); the compiler rejects that as an ambiguous
/// producer.
#[derive(Debug, Clone)]
pub struct JobDag {
    jobs: Vec<Job>,
    targets: Vec<FileHandle>,
    dependents: Vec<BTreeSet<JobId>>,
}

impl JobDag {
    /// Build the DAG, assigning ids by position and recomputing edges.
    pub fn new(mut jobs: Vec<Job>, targets: Vec<FileHandle>) -> Result<Self, CompileError> {
        for (idx, job) in jobs.iter_mut().enumerate() {
            job.id = idx;
            job.upstream.clear();
        }

        let mut producers: HashMap<&FileHandle, Vec<JobId>> = HashMap::new();
        for job in &jobs {
            for handle in job.products() {
                let entry = producers.entry(handle).or_default();
                if !entry.contains(&job.id) {
                    entry.push(job.id);
                }
            }
        }

        let mut upstream: Vec<BTreeSet<JobId>> = vec![BTreeSet::new(); jobs.len()];
        for job in &jobs {
            for input in &job.inputs {
                if let Some(ids) = producers.get(input) {
                    upstream[job.id].extend(ids.iter().copied());
                }
            }
        }

        let mut dependents: Vec<BTreeSet<JobId>> = vec![BTreeSet::new(); jobs.len()];
        for (id, ups) in upstream.iter().enumerate() {
            for up in ups {
                dependents[*up].insert(id);
            }
        }

        for (job, ups) in jobs.iter_mut().zip(upstream) {
            job.upstream = ups;
        }

        let dag = Self {
            jobs,
            targets,
            dependents,
        };
        dag.ensure_acyclic()?;

        debug!(
            jobs = dag.jobs.len(),
            targets = dag.targets.len(),
            "built job DAG"
        );
        Ok(dag)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Requested final targets, in selection order.
    pub fn targets(&self) -> &[FileHandle] {
        &self.targets
    }

    /// Immediate upstream jobs.
    pub fn dependencies_of(&self, id: JobId) -> Option<&BTreeSet<JobId>> {
        self.jobs.get(id).map(|j| &j.upstream)
    }

    /// Immediate downstream jobs.
    pub fn dependents_of(&self, id: JobId) -> Option<&BTreeSet<JobId>> {
        self.dependents.get(id)
    }

    fn ensure_acyclic(&self) -> Result<(), CompileError> {
        // Edge direction: upstream -> dependent.
        let mut graph: DiGraphMap<JobId, ()> = DiGraphMap::new();
        for job in &self.jobs {
            graph.add_node(job.id);
        }
        for job in &self.jobs {
            for up in &job.upstream {
                graph.add_edge(*up, job.id, ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let node = cycle.node_id();
                let members = tarjan_scc(&graph)
                    .into_iter()
                    .find(|scc| scc.contains(&node))
                    .unwrap_or_else(|| vec![node]);
                let mut jobs: Vec<String> = members
                    .iter()
                    .filter_map(|id| self.jobs.get(*id).map(Job::label))
                    .collect();
                jobs.sort();
                Err(CompileError::Cycle { jobs })
            }
        }
    }
}
