
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use affinity_tree::at_config::AffinityTreeConfigBuilder;
use affinity_tree::builder::AffinityTreeBuilder;
use affinity_tree::cutoff::MaxCutoffStrategy;
use affinity_tree::diagnostics::NullSink;
use affinity_tree::example_gen::generate_path_groups;
use affinity_tree::oracle::HeaviestBundleOracle;

pub fn bench_affinity_tree(c: &mut Criterion) {
    let num_groups = [2, 5];
    let per_group = [10, 30];
    let path_len = 1000;
    let divergence = 0.3;
    let error_rates = [0.0, 0.01, 0.05];

    let mut benchmark_group = c.benchmark_group("affinity-tree-group");
    benchmark_group.sample_size(10);

    for &ng in num_groups.iter() {
        for &pg in per_group.iter() {
            for &er in error_rates.iter() {
                let (graph, _groups) = generate_path_groups(ng, pg, path_len, divergence, er).unwrap();

                let test_label = format!("tree_{ng}x{pg}x{path_len}_{er}");
                let config = AffinityTreeConfigBuilder::default()
                    .stop(0.95)
                    .build().unwrap();
                benchmark_group.bench_function(&test_label, |b| b.iter(|| {
                    black_box({
                        let oracle = HeaviestBundleOracle::new(&graph);
                        let mut builder = AffinityTreeBuilder::new(config.clone(), oracle, NullSink).unwrap();
                        builder.build(&graph).unwrap()
                    });
                }));

                let test_label = format!("tree_max_{ng}x{pg}x{path_len}_{er}");
                let config = AffinityTreeConfigBuilder::default()
                    .stop(0.95)
                    .max_cutoff(Some(MaxCutoffStrategy::FullRange))
                    .build().unwrap();
                benchmark_group.bench_function(&test_label, |b| b.iter(|| {
                    black_box({
                        let oracle = HeaviestBundleOracle::new(&graph);
                        let mut builder = AffinityTreeBuilder::new(config.clone(), oracle, NullSink).unwrap();
                        builder.build(&graph).unwrap()
                    });
                }));
            }
        }
    }

    benchmark_group.finish();
}

criterion_group!(benches, bench_affinity_tree);
criterion_main!(benches);
