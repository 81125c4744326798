use pxb_common::{EntityKind, HarnessError, HarnessResult};
use std::collections::{BTreeSet, HashMap};

/// Teardown order for every entity kind, dependents first
pub fn teardown_order() -> HarnessResult<Vec<EntityKind>> {
    teardown_order_with(&EntityKind::ALL, |kind| kind.dependencies().to_vec())
}

/// Order `kinds` so each kind comes before every kind it depends on.
///
/// Among kinds that are ready at the same time, the one declared last in
/// `kinds` goes first. Dependencies outside `kinds` are ignored. A cycle
/// yields `InvalidConfiguration`.
pub fn teardown_order_with<F>(kinds: &[EntityKind], dependencies: F) -> HarnessResult<Vec<EntityKind>>
where
    F: Fn(EntityKind) -> Vec<EntityKind>,
{
    let position: HashMap<EntityKind, usize> =
        kinds.iter().enumerate().map(|(i, kind)| (*kind, i)).collect();

    // dependents[i] counts kinds that must be gone before kinds[i]
    let mut dependents = vec![0usize; kinds.len()];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); kinds.len()];
    for (i, kind) in kinds.iter().enumerate() {
        for dependency in dependencies(*kind) {
            if let Some(&j) = position.get(&dependency) {
                edges[i].push(j);
                dependents[j] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..kinds.len()).filter(|&i| dependents[i] == 0).collect();
    let mut order = Vec::with_capacity(kinds.len());

    while let Some(i) = ready.pop_last() {
        order.push(kinds[i]);
        for &j in &edges[i] {
            dependents[j] -= 1;
            if dependents[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < kinds.len() {
        let stuck: Vec<String> = kinds
            .iter()
            .filter(|kind| !order.contains(kind))
            .map(|kind| kind.to_string())
            .collect();
        return Err(HarnessError::InvalidConfiguration(format!(
            "Dependency cycle between entity kinds: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}
