//! # Canonical Ordering and Validation
//!
//! Tables must be in canonical order before a tree sequence can be built:
//!
//! - edges by parent time (ascending), then parent id, child id, left;
//! - sites by position, with duplicate positions rejected outright;
//! - mutations by site, parents before children along each chain.
//!
//! Sorting is stable and deterministic; sorting already-sorted tables is a
//! no-op. The build step validates these orders plus the referential
//! invariants but never reorders; unsorted input fails with `NotSorted`.

use tracing::debug;

use crate::error::{Result, TreeSeqError};
use crate::metadata::MetadataSchema;
use crate::tables::{SiteId, TableCollection};

/// Sort edges, sites and mutations into canonical order, remapping the
/// mutation site/parent columns as rows move.
pub(crate) fn sort_tables(tables: &mut TableCollection) -> Result<()> {
    sort_edges(tables)?;
    sort_sites(tables)?;
    sort_mutations(tables)?;
    debug!(
        edges = tables.edges.len(),
        sites = tables.sites.len(),
        mutations = tables.mutations.len(),
        "sorted tables"
    );
    Ok(())
}

fn sort_edges(tables: &mut TableCollection) -> Result<()> {
    let n_nodes = tables.nodes.len();
    for index in 0..tables.edges.len() {
        let parent = tables.edges.parents()[index];
        let child = tables.edges.children()[index];
        if parent.is_null() || parent.as_usize() >= n_nodes {
            return Err(TreeSeqError::dangling(format!(
                "edge {index} references unknown parent node {parent}"
            )));
        }
        if child.is_null() || child.as_usize() >= n_nodes {
            return Err(TreeSeqError::dangling(format!(
                "edge {index} references unknown child node {child}"
            )));
        }
    }

    let times = tables.nodes.times();
    let parents = tables.edges.parents();
    let children = tables.edges.children();
    let lefts = tables.edges.lefts();
    let mut order: Vec<usize> = (0..tables.edges.len()).collect();
    order.sort_by(|&a, &b| {
        times[parents[a].as_usize()]
            .total_cmp(&times[parents[b].as_usize()])
            .then_with(|| parents[a].cmp(&parents[b]))
            .then_with(|| children[a].cmp(&children[b]))
            .then_with(|| lefts[a].total_cmp(&lefts[b]))
    });
    tables.edges.apply_permutation(&order);
    Ok(())
}

fn sort_sites(tables: &mut TableCollection) -> Result<()> {
    let n_sites = tables.sites.len();
    for (index, &site) in tables.mutations.sites().iter().enumerate() {
        if site.is_null() || site.as_usize() >= n_sites {
            return Err(TreeSeqError::dangling(format!(
                "mutation {index} references unknown site {site}"
            )));
        }
    }

    let positions = tables.sites.positions();
    let mut order: Vec<usize> = (0..n_sites).collect();
    order.sort_by(|&a, &b| positions[a].total_cmp(&positions[b]));
    for pair in order.windows(2) {
        if positions[pair[0]] == positions[pair[1]] {
            return Err(TreeSeqError::DuplicateSitePosition {
                position: positions[pair[0]],
            });
        }
    }

    let mut site_map = vec![SiteId::NULL; n_sites];
    for (new, &old) in order.iter().enumerate() {
        site_map[old] = SiteId::new(new);
    }
    tables.sites.apply_permutation(&order);
    tables.mutations.remap_sites(&site_map);
    Ok(())
}

fn sort_mutations(tables: &mut TableCollection) -> Result<()> {
    let n = tables.mutations.len();
    let parents = tables.mutations.parents();
    for (index, &parent) in parents.iter().enumerate() {
        if !parent.is_null() && parent.as_usize() >= n {
            return Err(TreeSeqError::dangling(format!(
                "mutation {index} references unknown parent mutation {parent}"
            )));
        }
    }

    let depth = chain_depths(tables)?;
    let sites = tables.mutations.sites();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| sites[a].cmp(&sites[b]).then_with(|| depth[a].cmp(&depth[b])));
    tables.mutations.apply_permutation(&order);
    Ok(())
}

/// Distance of each mutation from the root of its parent chain. Parents get
/// smaller depths than their children, so sorting by depth puts every chain
/// in parent-before-child order.
fn chain_depths(tables: &TableCollection) -> Result<Vec<usize>> {
    let parents = tables.mutations.parents();
    let n = parents.len();
    let mut depth = vec![usize::MAX; n];
    for start in 0..n {
        if depth[start] != usize::MAX {
            continue;
        }
        let mut chain = Vec::new();
        let mut current = start;
        loop {
            if depth[current] != usize::MAX {
                break;
            }
            chain.push(current);
            if chain.len() > n {
                return Err(TreeSeqError::dangling(format!(
                    "mutation {start} parent chain does not terminate"
                )));
            }
            let parent = parents[current];
            if parent.is_null() {
                break;
            }
            current = parent.as_usize();
        }
        let mut next_depth = if depth[current] == usize::MAX {
            0
        } else {
            depth[current] + 1
        };
        for &member in chain.iter().rev() {
            depth[member] = next_depth;
            next_depth += 1;
        }
    }
    Ok(depth)
}

/// Check every referential and ordering invariant. The first violation is
/// returned; nothing is repaired.
pub(crate) fn validate(tables: &TableCollection) -> Result<()> {
    validate_nodes(tables)?;
    validate_edges(tables)?;
    validate_sites(tables)?;
    validate_mutations(tables)?;
    validate_individuals(tables)?;
    validate_migrations(tables)?;
    validate_metadata(tables)?;
    Ok(())
}

fn validate_nodes(tables: &TableCollection) -> Result<()> {
    let n_populations = tables.populations.len();
    let n_individuals = tables.individuals.len();
    for index in 0..tables.nodes.len() {
        let time = tables.nodes.times()[index];
        if !time.is_finite() {
            return Err(TreeSeqError::invalid_bound(format!(
                "node {index} time must be finite, got {time}"
            )));
        }
        let population = tables.nodes.populations()[index];
        if !population.is_null() && population.as_usize() >= n_populations {
            return Err(TreeSeqError::dangling(format!(
                "node {index} references unknown population {population}"
            )));
        }
        let individual = tables.nodes.individuals()[index];
        if !individual.is_null() && individual.as_usize() >= n_individuals {
            return Err(TreeSeqError::dangling(format!(
                "node {index} references unknown individual {individual}"
            )));
        }
    }
    Ok(())
}

fn validate_edges(tables: &TableCollection) -> Result<()> {
    let n_nodes = tables.nodes.len();
    let length = tables.sequence_length();
    let times = tables.nodes.times();
    let edges = &tables.edges;

    for index in 0..edges.len() {
        let parent = edges.parents()[index];
        let child = edges.children()[index];
        if parent.is_null() || parent.as_usize() >= n_nodes {
            return Err(TreeSeqError::dangling(format!(
                "edge {index} references unknown parent node {parent}"
            )));
        }
        if child.is_null() || child.as_usize() >= n_nodes {
            return Err(TreeSeqError::dangling(format!(
                "edge {index} references unknown child node {child}"
            )));
        }

        let left = edges.lefts()[index];
        let right = edges.rights()[index];
        if !(left >= 0.0) || !(right <= length) || !(left < right) {
            return Err(TreeSeqError::bad_interval(format!(
                "edge {index} interval [{left}, {right}) is not within [0, {length})"
            )));
        }

        let parent_time = times[parent.as_usize()];
        let child_time = times[child.as_usize()];
        if !(parent_time > child_time) {
            return Err(TreeSeqError::time_order(format!(
                "edge {index}: parent {parent} (time {parent_time}) is not strictly \
                 older than child {child} (time {child_time})"
            )));
        }

        if index > 0 {
            let prev_parent = edges.parents()[index - 1];
            let prev_child = edges.children()[index - 1];
            let prev_left = edges.lefts()[index - 1];
            let key = (
                times[parent.as_usize()],
                parent.0,
                child.0,
                left,
            );
            let prev_key = (
                times[prev_parent.as_usize()],
                prev_parent.0,
                prev_child.0,
                prev_left,
            );
            let ordering = prev_key
                .0
                .total_cmp(&key.0)
                .then(prev_key.1.cmp(&key.1))
                .then(prev_key.2.cmp(&key.2))
                .then(prev_key.3.total_cmp(&key.3));
            if ordering == std::cmp::Ordering::Greater {
                return Err(TreeSeqError::not_sorted(format!(
                    "edge {index} is out of canonical order"
                )));
            }
            if parent == prev_parent
                && child == prev_child
                && left == prev_left
                && right == edges.rights()[index - 1]
            {
                return Err(TreeSeqError::DuplicateEdge { index });
            }
        }
    }
    Ok(())
}

fn validate_sites(tables: &TableCollection) -> Result<()> {
    let length = tables.sequence_length();
    let positions = tables.sites.positions();
    for (index, &position) in positions.iter().enumerate() {
        if !(position >= 0.0) || !(position < length) {
            return Err(TreeSeqError::bad_interval(format!(
                "site {index} position {position} is not within [0, {length})"
            )));
        }
        if index > 0 {
            if position == positions[index - 1] {
                return Err(TreeSeqError::DuplicateSitePosition { position });
            }
            if position < positions[index - 1] {
                return Err(TreeSeqError::not_sorted(format!(
                    "site {index} position {position} is out of order"
                )));
            }
        }
    }
    Ok(())
}

fn validate_mutations(tables: &TableCollection) -> Result<()> {
    let n_sites = tables.sites.len();
    let n_nodes = tables.nodes.len();
    let mutations = &tables.mutations;
    let node_times = tables.nodes.times();

    for index in 0..mutations.len() {
        let site = mutations.sites()[index];
        if site.is_null() || site.as_usize() >= n_sites {
            return Err(TreeSeqError::dangling(format!(
                "mutation {index} references unknown site {site}"
            )));
        }
        let node = mutations.nodes()[index];
        if node.is_null() || node.as_usize() >= n_nodes {
            return Err(TreeSeqError::dangling(format!(
                "mutation {index} references unknown node {node}"
            )));
        }
        if index > 0 && site < mutations.sites()[index - 1] {
            return Err(TreeSeqError::not_sorted(format!(
                "mutation {index} site {site} is out of order"
            )));
        }

        let parent = mutations.parents()[index];
        if !parent.is_null() {
            if parent.as_usize() >= mutations.len() {
                return Err(TreeSeqError::dangling(format!(
                    "mutation {index} references unknown parent mutation {parent}"
                )));
            }
            if parent.as_usize() >= index {
                return Err(TreeSeqError::not_sorted(format!(
                    "mutation {index} precedes its parent mutation {parent}"
                )));
            }
            if mutations.sites()[parent.as_usize()] != site {
                return Err(TreeSeqError::dangling(format!(
                    "mutation {index} has parent {parent} at a different site"
                )));
            }
        }

        let time = mutations.times()[index];
        if !time.is_nan() {
            let node_time = node_times[node.as_usize()];
            if time < node_time {
                return Err(TreeSeqError::time_order(format!(
                    "mutation {index} time {time} is below its node's time {node_time}"
                )));
            }
            if !parent.is_null() {
                let parent_time = mutations.times()[parent.as_usize()];
                if !parent_time.is_nan() && time > parent_time {
                    return Err(TreeSeqError::time_order(format!(
                        "mutation {index} time {time} exceeds its parent's time {parent_time}"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_individuals(tables: &TableCollection) -> Result<()> {
    let n = tables.individuals.len();
    for index in 0..n {
        for &parent in tables.individuals.parents().get(index) {
            if !parent.is_null() && parent.as_usize() >= n {
                return Err(TreeSeqError::dangling(format!(
                    "individual {index} references unknown parent individual {parent}"
                )));
            }
        }
    }

    // White/grey/black DFS over the parent DAG; a grey-on-grey hit is a cycle.
    let mut color = vec![0u8; n];
    for start in 0..n {
        if color[start] != 0 {
            continue;
        }
        color[start] = 1;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(frame) = stack.last_mut() {
            let (individual, cursor) = *frame;
            let parents = tables.individuals.parents().get(individual);
            if cursor >= parents.len() {
                color[individual] = 2;
                stack.pop();
                continue;
            }
            frame.1 += 1;
            let parent = parents[cursor];
            if parent.is_null() {
                continue;
            }
            match color[parent.as_usize()] {
                0 => {
                    color[parent.as_usize()] = 1;
                    stack.push((parent.as_usize(), 0));
                }
                1 => {
                    return Err(TreeSeqError::IndividualCycle {
                        individual: parent.0,
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn validate_migrations(tables: &TableCollection) -> Result<()> {
    let n_nodes = tables.nodes.len();
    let n_populations = tables.populations.len();
    let length = tables.sequence_length();
    let migrations = &tables.migrations;

    for index in 0..migrations.len() {
        let node = migrations.nodes()[index];
        if node.is_null() || node.as_usize() >= n_nodes {
            return Err(TreeSeqError::dangling(format!(
                "migration {index} references unknown node {node}"
            )));
        }
        for population in [migrations.sources()[index], migrations.dests()[index]] {
            if population.is_null() || population.as_usize() >= n_populations {
                return Err(TreeSeqError::dangling(format!(
                    "migration {index} references unknown population {population}"
                )));
            }
        }
        let left = migrations.lefts()[index];
        let right = migrations.rights()[index];
        if !(left >= 0.0) || !(right <= length) || !(left < right) {
            return Err(TreeSeqError::bad_interval(format!(
                "migration {index} interval [{left}, {right}) is not within [0, {length})"
            )));
        }
    }
    Ok(())
}

/// When a schema is bound, every row's metadata bytes must decode under it.
fn validate_metadata(tables: &TableCollection) -> Result<()> {
    let columns = [
        tables.nodes.metadata_column(),
        tables.edges.metadata_column(),
        tables.sites.metadata_column(),
        tables.mutations.metadata_column(),
        tables.individuals.metadata_column(),
        tables.populations.metadata_column(),
        tables.migrations.metadata_column(),
    ];
    for column in columns {
        if matches!(column.schema(), MetadataSchema::Null) {
            continue;
        }
        for index in 0..column.len() {
            column.decode(index)?;
        }
    }
    if !tables.metadata_schema().is_null() {
        tables.metadata()?;
    }
    if !tables.reference_sequence().metadata_schema().is_null() {
        tables.reference_sequence().metadata()?;
    }
    Ok(())
}
