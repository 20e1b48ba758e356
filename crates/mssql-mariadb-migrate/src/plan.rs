//! Table ordering for a migration run.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::core::schema::Table;

/// Ordered list of tables to migrate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Tables in migration order.
    pub tables: Vec<String>,
    /// Priority entries that do not exist in the source.
    pub skipped: Vec<String>,
}

impl MigrationPlan {
    /// Priority tables first, in the given order, then every other discovered
    /// table in discovery order.
    ///
    /// Names are matched case-insensitively against the discovered tables and
    /// the source spelling is kept. Priority entries missing from the source
    /// are skipped and logged.
    pub fn build(priority: &[String], discovered: &[String]) -> Self {
        let by_lower: HashMap<String, &String> =
            discovered.iter().map(|t| (t.to_lowercase(), t)).collect();

        let mut plan = MigrationPlan::default();
        let mut seen = HashSet::new();

        for name in priority {
            match by_lower.get(&name.to_lowercase()) {
                Some(actual) => {
                    if seen.insert(actual.to_lowercase()) {
                        plan.tables.push((*actual).clone());
                    }
                }
                None => {
                    warn!(table = %name, "Priority table not found in source, skipping");
                    plan.skipped.push(name.clone());
                }
            }
        }

        for name in discovered {
            if seen.insert(name.to_lowercase()) {
                plan.tables.push(name.clone());
            }
        }

        info!(
            "Migration plan: {} tables ({} skipped)",
            plan.tables.len(),
            plan.skipped.len()
        );
        plan
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Order tables so that referenced tables come before the tables that
/// reference them.
///
/// Ties keep the input order. Tables in a reference cycle are appended in
/// input order after everything that could be ordered. Self-references and
/// references to tables outside the set are ignored.
pub fn dependency_order(tables: &[Table]) -> Vec<String> {
    let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
    let index: HashMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.to_lowercase(), i))
        .collect();

    // pending[i]: referenced tables not yet placed
    let mut pending: Vec<usize> = vec![0; names.len()];
    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, table) in tables.iter().enumerate() {
        let mut parents = HashSet::new();
        for fk in &table.foreign_keys {
            if let Some(&p) = index.get(&fk.ref_table.to_lowercase()) {
                if p != i && parents.insert(p) {
                    children.entry(p).or_default().push(i);
                    pending[i] += 1;
                }
            }
        }
    }

    let mut order = Vec::with_capacity(names.len());
    let mut placed = vec![false; names.len()];
    loop {
        // Lowest input index among ready tables keeps the order stable.
        let next = (0..names.len()).find(|&i| !placed[i] && pending[i] == 0);
        let Some(i) = next else { break };
        placed[i] = true;
        order.push(names[i].clone());
        if let Some(kids) = children.get(&i) {
            for &k in kids {
                pending[k] -= 1;
            }
        }
    }

    let cyclic: Vec<String> = (0..names.len())
        .filter(|&i| !placed[i])
        .map(|i| names[i].clone())
        .collect();
    if !cyclic.is_empty() {
        warn!("Foreign key cycle among {:?}, keeping discovery order", cyclic);
        order.extend(cyclic);
    }

    order
}
