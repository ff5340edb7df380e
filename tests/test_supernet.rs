//! End-to-end supernet tests

use ndarray::Array4;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use supernet::arch::{sample_architecture, Architecture, CellArch};
use supernet::network::{NasNetwork, NetworkConfig};

fn small_config() -> NetworkConfig {
    NetworkConfig {
        layers: 2,
        nodes: 2,
        channels: 4,
        keep_prob: 1.0,
        drop_path_keep_prob: None,
        use_aux_head: false,
        steps: 1,
        ..NetworkConfig::default()
    }
}

fn identity_arch() -> Architecture {
    Architecture::new(
        CellArch::new(vec![0, 4, 1, 4, 0, 4, 1, 4]),
        CellArch::new(vec![0, 4, 1, 4, 0, 4, 1, 4]),
    )
}

fn image_batch(batch: usize, seed: u64) -> Array4<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    Array4::from_shape_fn((batch, 3, 32, 32), |_| rng.gen::<f64>() - 0.5)
}

#[test]
fn test_forward_produces_logits_for_identity_arch() {
    let mut net = NasNetwork::new(small_config(), Some(42)).unwrap();
    let input = image_batch(2, 0);
    let (logits, aux) = net.forward(&input, &identity_arch(), None);
    assert_eq!(logits.dim(), (2, 10));
    assert!(aux.is_none());
    assert!(logits.iter().all(|v| v.is_finite()));
}

#[test]
fn test_forward_is_deterministic_without_path_drop() {
    let mut net = NasNetwork::new(small_config(), Some(42)).unwrap();
    net.eval();
    let input = image_batch(2, 1);
    let arch = identity_arch();
    let (a, _) = net.forward(&input, &arch, None);
    let (b, _) = net.forward(&input, &arch, None);
    assert_eq!(a, b);
}

#[test]
fn test_unit_keep_prob_matches_disabled_path_drop() {
    // keep prob 1.0 must be an exact no-op, bit-identical to no path drop
    let mut disabled = NasNetwork::new(small_config(), Some(7)).unwrap();
    let mut unit = NasNetwork::new(
        NetworkConfig {
            drop_path_keep_prob: Some(1.0),
            ..small_config()
        },
        Some(7),
    )
    .unwrap();
    let input = image_batch(2, 2);
    let arch = identity_arch();
    let (a, _) = disabled.forward(&input, &arch, None);
    let (b, _) = unit.forward(&input, &arch, Some(0));
    assert_eq!(a, b);
}

#[test]
fn test_seeded_runs_reproduce_with_path_drop() {
    let config = NetworkConfig {
        drop_path_keep_prob: Some(0.6),
        steps: 100,
        ..small_config()
    };
    let mut a = NasNetwork::new(config.clone(), Some(42)).unwrap();
    let mut b = NasNetwork::new(config, Some(42)).unwrap();
    let input = image_batch(2, 3);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
    for step in 0..3 {
        let arch = sample_architecture(2, &mut rng);
        let (la, _) = a.forward(&input, &arch, Some(step));
        let (lb, _) = b.forward(&input, &arch, Some(step));
        assert_eq!(la, lb, "step {step}");
    }
}

#[test]
fn test_aux_head_only_fires_in_training() {
    let config = NetworkConfig {
        use_aux_head: true,
        ..small_config()
    };
    let mut net = NasNetwork::new(config, Some(42)).unwrap();
    let input = image_batch(2, 4);
    let arch = identity_arch();

    let (_, aux) = net.forward(&input, &arch, None);
    let aux = aux.expect("training mode must produce auxiliary logits");
    assert_eq!(aux.dim(), (2, 10));

    net.eval();
    let (_, aux) = net.forward(&input, &arch, None);
    assert!(aux.is_none());
}

#[test]
fn test_sampled_architectures_share_one_network() {
    // many random encodings route through the same pre-built modules;
    // the parameter count never moves
    let mut net = NasNetwork::new(small_config(), Some(42)).unwrap();
    net.eval();
    let params = net.num_params();
    let input = image_batch(1, 5);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    for _ in 0..8 {
        let arch = sample_architecture(2, &mut rng);
        let (logits, _) = net.forward(&input, &arch, None);
        assert_eq!(logits.dim(), (1, 10));
        assert_eq!(net.num_params(), params);
    }
}

#[test]
fn test_invalid_encoding_is_rejected_before_any_compute() {
    let arch = Architecture::new(
        CellArch::new(vec![0, 9, 1, 4, 0, 4, 1, 4]),
        CellArch::new(vec![0, 4, 1, 4, 0, 4, 1, 4]),
    );
    assert!(arch.validate(2).is_err());

    let mut net = NasNetwork::new(small_config(), Some(42)).unwrap();
    let input = image_batch(1, 6);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        net.forward(&input, &arch, None)
    }));
    assert!(result.is_err());
}

#[test]
fn test_config_validation_surfaces_errors() {
    let config = NetworkConfig {
        channels: 0,
        ..small_config()
    };
    assert!(NasNetwork::new(config, Some(42)).is_err());

    let config = NetworkConfig {
        keep_prob: 1.2,
        ..small_config()
    };
    assert!(NasNetwork::new(config, Some(42)).is_err());
}
