// crates/ms_io/tests/persistence_tests.rs

//! 检查点与合并集成测试

use ms_io::{
    concatenate, concatenate_all, load_results, CheckpointStore, GridDims, IoError, KindShape,
    OutputKind, ResultSet, SampleStatus,
};
use ndarray::{Array, Array1, Array2, IxDyn};

const GRID: GridDims = GridDims {
    nodes: 100,
    elevation_stations: 3,
    velocity_stations: 2,
    met_stations: 0,
};

fn shard(offset: usize, n: usize) -> ResultSet {
    let samples = Array2::from_shape_fn((4, n), |(i, j)| 0.02 + 0.001 * (i + 10 * (offset + j)) as f64);
    let kinds = [OutputKind::Fort61, OutputKind::Fort62, OutputKind::MaxEle63];
    let mut rs = ResultSet::allocate(samples, &kinds, |k| GRID.shape_of(k, 20)).unwrap();

    for s in 0..n {
        let g = (offset + s) as f64;
        for kind in kinds {
            let dims = GRID.shape_of(kind, 20).sample_dims();
            let value = Array::from_shape_fn(IxDyn(&dims), |idx| g + idx[0] as f64 * 0.01);
            rs.record(s, kind, value.view()).unwrap();
        }
        rs.set_status(s, SampleStatus::Completed).unwrap();
    }
    rs.record_times(OutputKind::Fort61, Array1::linspace(0.0, 68400.0, 20)).unwrap();
    rs.record_times(OutputKind::Fort62, Array1::linspace(0.0, 68400.0, 20)).unwrap();
    rs
}

#[test]
fn test_checkpoint_round_trip_representative_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.msck");
    let rs = shard(0, 5);

    CheckpointStore::new(&path, 3).write(&rs).unwrap();
    let loaded = load_results(&path).unwrap();

    assert_eq!(loaded, rs);
    assert_eq!(loaded.nodal()[&OutputKind::MaxEle63].shape(), &[100, 5]);
    assert_eq!(loaded.series()[&OutputKind::Fort61].shape(), &[3, 20, 5]);
    assert_eq!(loaded.series()[&OutputKind::Fort62].shape(), &[2, 20, 2, 5]);
}

#[test]
fn test_store_begin_rotates_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("sweep.msck"), 3);

    assert!(store.begin().unwrap().is_none());
    store.write(&shard(0, 2)).unwrap();

    let backup = store.begin().unwrap().unwrap();
    assert_eq!(backup.file_name().unwrap(), "1sweep.msck");
    assert!(!store.path().exists());
    assert_eq!(load_results(&backup).unwrap().num_samples(), 2);
}

#[test]
fn test_concatenation_is_associative() {
    let (a, b, c) = (shard(0, 2), shard(2, 3), shard(5, 1));

    let left = concatenate(concatenate(a.clone(), &b).unwrap(), &c).unwrap();
    let bc = concatenate(b, &c).unwrap();
    let right = concatenate(a, &bc).unwrap();

    assert_eq!(left, right);
    assert_eq!(left.num_samples(), 6);
    assert_eq!(left.nodal()[&OutputKind::MaxEle63][[0, 5]], 5.0);
}

#[test]
fn test_concatenate_all_matches_pairwise() {
    let folded = concatenate_all(vec![shard(0, 2), shard(2, 3), shard(5, 1)]).unwrap();
    let pairwise = concatenate(concatenate(shard(0, 2), &shard(2, 3)).unwrap(), &shard(5, 1)).unwrap();
    assert_eq!(folded, pairwise);
}

#[test]
fn test_merge_rejects_different_station_count() {
    let a = shard(0, 2);
    let samples = Array2::zeros((4, 1));
    let b = ResultSet::allocate(
        samples,
        &[OutputKind::Fort61, OutputKind::Fort62, OutputKind::MaxEle63],
        |k| match k {
            OutputKind::Fort61 => KindShape::series(4, 20),
            k => GRID.shape_of(k, 20),
        },
    )
    .unwrap();

    let err = concatenate(a, &b).unwrap_err();
    assert!(matches!(err, IoError::MergeShapeMismatch { ref key, .. } if key == "fort61"));
}
