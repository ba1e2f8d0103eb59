use rand::prelude::*;
use rstest::*;

use docent::utils::l2_normalize;
use docent::{EmbeddingIndex, IndexError};

const DIM: usize = 64;

fn random_vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut v = (0..DIM).map(|_| rng.random_range(-1.0..1.0)).collect::<Vec<f32>>();
            l2_normalize(&mut v);
            v
        })
        .collect()
}

#[fixture]
fn vectors() -> Vec<Vec<f32>> {
    random_vectors(200, 42)
}

#[fixture]
fn index(vectors: Vec<Vec<f32>>) -> EmbeddingIndex {
    let mut index = EmbeddingIndex::new(DIM).unwrap();
    index.add(&vectors).unwrap();
    index
}

#[rstest]
#[case(0)]
#[case(57)]
#[case(199)]
fn query_finds_itself(index: EmbeddingIndex, vectors: Vec<Vec<f32>>, #[case] position: usize) {
    let top = index.search(&vectors[position], 1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].position, position);
    assert!((top[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn single_vector_round_trip() {
    let v = random_vectors(1, 7).remove(0);
    let mut index = EmbeddingIndex::new(DIM).unwrap();
    index.add(&[v.clone()]).unwrap();
    let top = index.search(&v, 1).unwrap();
    assert_eq!(top[0].position, 0);
    assert!((top[0].score - 1.0).abs() < 1e-5);
}

#[rstest]
fn results_sorted_descending(index: EmbeddingIndex) {
    let query = random_vectors(1, 1234).remove(0);
    let top = index.search(&query, 10).unwrap();
    assert_eq!(top.len(), 10);
    assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn k_clamped_to_size() {
    let vectors = random_vectors(3, 3);
    let mut index = EmbeddingIndex::new(DIM).unwrap();
    index.add(&vectors).unwrap();
    assert_eq!(index.search(&vectors[0], 10).unwrap().len(), 3);
}

#[test]
fn positions_follow_insertion_order() {
    let vectors = random_vectors(6, 9);
    let mut index = EmbeddingIndex::new(DIM).unwrap();
    index.add(&vectors[..4]).unwrap();
    index.add(&vectors[4..]).unwrap();
    assert_eq!(index.len(), 6);
    assert_eq!(index.search(&vectors[5], 1).unwrap()[0].position, 5);
}

#[rstest]
fn existence_threshold(index: EmbeddingIndex, vectors: Vec<Vec<f32>>) {
    let hit = index.identify(&vectors[3], 0.99).unwrap().unwrap();
    assert_eq!(hit.position, 3);

    let mut opposite = vectors[3].iter().map(|x| -x).collect::<Vec<_>>();
    l2_normalize(&mut opposite);
    assert!(index.identify(&opposite, 0.99).unwrap().is_none());
}

#[test]
fn query_dimension_checked() {
    let index = EmbeddingIndex::new(DIM).unwrap();
    let err = index.search(&[0.0; 3], 1).unwrap_err();
    assert!(matches!(err, IndexError::DimensionMismatch { expected: DIM, actual: 3 }));
}

#[test]
fn save_and_open() {
    let dir = assert_fs::TempDir::new().unwrap();
    let path = dir.path().join("artworks.usearch");
    let vectors = random_vectors(20, 5);

    let mut index = EmbeddingIndex::new(DIM).unwrap();
    index.add(&vectors).unwrap();
    index.save(&path).unwrap();

    let loaded = EmbeddingIndex::open(&path, DIM).unwrap();
    assert_eq!(loaded.len(), 20);
    assert_eq!(loaded.search(&vectors[11], 1).unwrap()[0].position, 11);
}
