mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flow::collector::Collector;
use flow::pipeline::Pipeline;
use flow::stages::Processor;
use rand::Rng;
use tokio::time::timeout;

use crate::common::{TEST_DEADLINE, init_test_tracing, test_config};

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_map_preserves_order() {
    init_test_tracing();

    let input: Vec<i64> = (0..50).collect();
    let expected: Vec<i64> = input.iter().map(|x| x + 1).collect();

    let result = Pipeline::from_iter(input, test_config())
        .unwrap()
        .map(|x| x + 1, 1)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    assert_eq!(result, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_map_preserves_the_multiset() {
    init_test_tracing();

    let input: Vec<i64> = {
        let mut rng = rand::thread_rng();
        (0..200).map(|_| rng.gen_range(-1000..1000)).collect()
    };
    let mut expected: Vec<i64> = input.iter().map(|x| x * 3).collect();
    expected.sort_unstable();

    let mut result = Pipeline::from_iter(input, test_config())
        .unwrap()
        .map(|x| x * 3, 4)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();
    result.sort_unstable();

    assert_eq!(result, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn filter_keeps_the_ordered_matching_subsequence() {
    init_test_tracing();

    let input: Vec<i64> = (0..40).collect();
    let expected: Vec<i64> = input.iter().copied().filter(|x| x % 3 == 0).collect();

    // Filtering twice with the same predicate changes nothing.
    let result = Pipeline::from_iter(input, test_config())
        .unwrap()
        .filter(|x| x % 3 == 0)
        .unwrap()
        .filter(|x| x % 3 == 0)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    assert_eq!(result, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn explode_of_singletons_matches_identity_map() {
    init_test_tracing();

    let input: Vec<i64> = (0..30).collect();

    let exploded = Pipeline::from_iter(input.clone(), test_config())
        .unwrap()
        .explode(|x| vec![x])
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    let mapped = Pipeline::from_iter(input, test_config())
        .unwrap()
        .map(|x| x, 1)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    assert_eq!(exploded, mapped);
}

#[tokio::test(flavor = "multi_thread")]
async fn explode_can_drop_and_expand_items() {
    init_test_tracing();

    let result = Pipeline::from_iter(vec![0usize, 1, 2, 3], test_config())
        .unwrap()
        .explode(|x| std::iter::repeat(x).take(x).collect::<Vec<_>>())
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    assert_eq!(result, vec![1, 2, 2, 3, 3, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_windows_concatenate_back_to_the_input() {
    init_test_tracing();

    let kept = Pipeline::from_iter(vec![1, 2, 3, 4, 5, 6, 7], test_config())
        .unwrap()
        .batch(3, true)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();
    assert_eq!(kept, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);

    let truncated = Pipeline::from_iter(vec![1, 2, 3, 4, 5, 6, 7], test_config())
        .unwrap()
        .batch(3, false)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();
    assert_eq!(truncated, vec![vec![1, 2, 3], vec![4, 5, 6]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn time_batch_concatenation_preserves_the_input() {
    init_test_tracing();

    let input: Vec<i64> = (0..50).collect();

    let batches = Pipeline::from_iter(input.clone(), test_config())
        .unwrap()
        .time_batch(Duration::from_millis(20))
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    assert!(batches.iter().all(|batch| !batch.is_empty()));

    let flattened: Vec<i64> = batches.into_iter().flatten().collect();
    assert_eq!(flattened, input);
}

#[tokio::test(flavor = "multi_thread")]
async fn reduce_folds_the_whole_sequence() {
    init_test_tracing();

    let total = Pipeline::from_iter(vec![1, 2, 3], test_config())
        .unwrap()
        .wait_and_reduce(0, |item, acc| acc + item)
        .await
        .unwrap();

    assert_eq!(total, 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn reduce_of_an_empty_source_yields_the_seed() {
    init_test_tracing();

    let total = Pipeline::from_iter(Vec::<i64>::new(), test_config())
        .unwrap()
        .wait_and_reduce(42, |item, acc| acc + item)
        .await
        .unwrap();

    assert_eq!(total, 42);
}

#[tokio::test(flavor = "multi_thread")]
async fn doubled_then_filtered_scenario() {
    init_test_tracing();

    let result = Pipeline::from_iter(vec![1, 2, 3, 4, 5], test_config())
        .unwrap()
        .map(|x| x * 2, 1)
        .unwrap()
        .filter(|x| *x > 4)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();

    assert_eq!(result, vec![6, 8, 10]);
}

#[tokio::test(flavor = "multi_thread")]
async fn chained_stages_drain_end_to_end() {
    init_test_tracing();

    let input: Vec<i64> = (0..100).collect();
    let expected: usize = input
        .iter()
        .map(|x| x * 2)
        .filter(|x| x % 3 != 0)
        .count()
        .div_ceil(4);

    let wait = Pipeline::from_iter(input, test_config())
        .unwrap()
        .map(|x| x * 2, 2)
        .unwrap()
        .filter(|x| x % 3 != 0)
        .unwrap()
        .batch(4, true)
        .unwrap()
        .wait_for_result();

    let batches = timeout(TEST_DEADLINE, wait).await.unwrap().unwrap();
    assert_eq!(batches.len(), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_completes_with_no_results() {
    init_test_tracing();

    let wait = Pipeline::from_iter(Vec::<i64>::new(), test_config())
        .unwrap()
        .map(|x| x + 1, 2)
        .unwrap()
        .wait_for_result();

    let result = timeout(TEST_DEADLINE, wait).await.unwrap().unwrap();
    assert!(result.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn stateful_map_builds_one_processor_per_worker_and_closes_each() {
    init_test_tracing();

    struct Offset {
        amount: i64,
        closed: Arc<AtomicUsize>,
    }

    impl Processor<i64> for Offset {
        type Output = i64;

        fn process(&mut self, item: i64) -> i64 {
            item + self.amount
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    let constructed = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));

    let factory = {
        let constructed = Arc::clone(&constructed);
        let closed = Arc::clone(&closed);
        move || {
            constructed.fetch_add(1, Ordering::SeqCst);
            Offset {
                amount: 100,
                closed: Arc::clone(&closed),
            }
        }
    };

    let input: Vec<i64> = (0..60).collect();
    let mut expected: Vec<i64> = input.iter().map(|x| x + 100).collect();
    expected.sort_unstable();

    let mut result = Pipeline::from_iter(input, test_config())
        .unwrap()
        .stateful_map(factory, 3)
        .unwrap()
        .wait_for_result()
        .await
        .unwrap();
    result.sort_unstable();

    assert_eq!(result, expected);
    assert_eq!(constructed.load(Ordering::SeqCst), 3);
    assert_eq!(closed.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn collector_returns_one_list_per_tracked_handle() {
    init_test_tracing();

    let doubled = Pipeline::from_iter(vec![1, 2, 3], test_config())
        .unwrap()
        .map(|x| x * 2, 1)
        .unwrap()
        .start();

    let squared = Pipeline::from_iter(vec![1, 2, 3], test_config())
        .unwrap()
        .map(|x| x * x, 1)
        .unwrap()
        .start();

    let mut collector = Collector::new();
    collector.track(doubled);
    collector.track(squared);

    let results = collector.wait_for_results().await.unwrap();
    assert_eq!(results, vec![vec![2, 4, 6], vec![1, 4, 9]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_wait_discards_items_but_still_drains() {
    init_test_tracing();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let wait = Pipeline::from_iter((0..100).collect::<Vec<i64>>(), test_config())
        .unwrap()
        .map(
            move |x| {
                counter.fetch_add(1, Ordering::SeqCst);
                x
            },
            1,
        )
        .unwrap()
        .wait_for_completion();

    timeout(TEST_DEADLINE, wait).await.unwrap().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 100);
}
