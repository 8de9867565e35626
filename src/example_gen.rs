
use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::path_graph::{NodeId, PoaGraph, SequenceId};

/// Creates a path graph with a known grouping we can verify clustering against.
/// Every group gets a backbone that follows a shared backbone except at diverged positions, and every sequence is a noisy copy of its group backbone.
/// Node ids are assigned position-major, so every path is topologically ordered.
/// # Arguments
/// * `num_groups` - the number of true groups
/// * `per_group` - the number of sequences generated for each group
/// * `path_len` - the length of the backbones
/// * `divergence` - probability that a group backbone leaves the shared backbone at a position
/// * `error_rate` - overall per-position error rate of a sequence, split equally between substitution and deletion
/// # Errors
/// * if the generated paths cannot be added to the graph
pub fn generate_path_groups(
    num_groups: usize, per_group: usize, path_len: usize, divergence: f64, error_rate: f64
) -> Result<(PoaGraph, BTreeMap<SequenceId, usize>), Box<dyn std::error::Error>> {
    assert!(num_groups > 0);
    assert!(path_len > 0);
    assert!((0.0..=1.0).contains(&divergence));
    assert!((0.0..=1.0).contains(&error_rate));

    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let unit_distribution = Uniform::new(0.0, 1.0);
    let error_type_distribution = Uniform::new(0, 2);

    // slot 0 is the shared node, slots 1..=num_groups are group variants, the last slot is the error node
    let slots_per_position = num_groups + 2;
    let node_at = |position: usize, slot: usize| -> NodeId { position * slots_per_position + slot };

    let backbones: Vec<Vec<NodeId>> = (0..num_groups)
        .map(|group| {
            (0..path_len)
                .map(|position| {
                    if rng.sample(unit_distribution) < divergence {
                        node_at(position, group + 1)
                    } else {
                        node_at(position, 0)
                    }
                })
                .collect()
        })
        .collect();

    let mut graph = PoaGraph::default();
    let mut groups = BTreeMap::new();
    for (group, backbone) in backbones.iter().enumerate() {
        for sample in 0..per_group {
            let mut path = vec![];
            for (position, &node_id) in backbone.iter().enumerate() {
                let is_error = rng.sample(unit_distribution) < error_rate;
                if is_error {
                    match rng.sample(error_type_distribution) {
                        // substitution
                        0 => path.push(node_at(position, slots_per_position - 1)),
                        // deletion
                        _ => {}
                    }
                } else {
                    path.push(node_id);
                }
            }
            if path.is_empty() {
                path.push(backbone[0]);
            }

            let seq_id = SequenceId::new(format!("group_{group}_seq_{sample}"));
            graph.add_sequence(seq_id.clone(), vec![path])?;
            groups.insert(seq_id, group);
        }
    }

    Ok((graph, groups))
}
