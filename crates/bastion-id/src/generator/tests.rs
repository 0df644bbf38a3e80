use crate::{
    Error, IdGenStatus, IdGenerator, LockSnowflakeGenerator, MonotonicClock, Snowflake,
    SnowflakeId, SystemClock, TimeSource,
};
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread::scope;

struct MockTime {
    millis: u64,
}

impl TimeSource<u64> for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

#[derive(Clone)]
struct SteppedTime {
    values: Rc<Vec<u64>>,
    index: Rc<Cell<usize>>,
}

impl SteppedTime {
    fn new(values: Vec<u64>) -> Self {
        Self {
            values: Rc::new(values),
            index: Rc::new(Cell::new(0)),
        }
    }

    fn advance(&self) {
        self.index.set(self.index.get() + 1);
    }
}

impl TimeSource<u64> for SteppedTime {
    fn current_millis(&self) -> u64 {
        self.values[self.index.get()]
    }
}

trait IdGenStatusExt {
    fn unwrap_ready(self) -> SnowflakeId;
    fn unwrap_pending(self) -> u64;
}

impl IdGenStatusExt for IdGenStatus<SnowflakeId> {
    fn unwrap_ready(self) -> SnowflakeId {
        match self {
            Self::Ready { id } => id,
            Self::Pending { yield_for } => panic!("unexpected pending (yield for: {yield_for})"),
        }
    }

    fn unwrap_pending(self) -> u64 {
        match self {
            Self::Ready { id } => panic!("unexpected ready ({id})"),
            Self::Pending { yield_for } => yield_for,
        }
    }
}

#[test]
fn sequence_increments_within_the_same_millisecond() {
    let generator: LockSnowflakeGenerator<SnowflakeId, _> =
        LockSnowflakeGenerator::new(3, MockTime { millis: 42 });

    let id1 = generator.next_id().unwrap_ready();
    let id2 = generator.next_id().unwrap_ready();
    let id3 = generator.next_id().unwrap_ready();

    assert_eq!(id1.timestamp(), 42);
    assert_eq!(id3.timestamp(), 42);
    assert_eq!(id1.sequence(), 0);
    assert_eq!(id2.sequence(), 1);
    assert_eq!(id3.sequence(), 2);
    assert_eq!(id1.node_id(), 3);
    assert!(id1 < id2 && id2 < id3);
}

#[test]
fn exhausted_sequence_reports_pending_instead_of_wrapping() {
    let generator: LockSnowflakeGenerator<SnowflakeId, _> = LockSnowflakeGenerator::from_components(
        7,
        0,
        SnowflakeId::max_sequence(),
        MockTime { millis: 7 },
    );
    assert_eq!(generator.next_id().unwrap_pending(), 1);
    assert_eq!(generator.next_id().unwrap_pending(), 1);
}

#[test]
fn clock_behind_reports_the_gap() {
    let generator: LockSnowflakeGenerator<SnowflakeId, _> =
        LockSnowflakeGenerator::from_components(50, 0, 0, MockTime { millis: 45 });
    assert_eq!(generator.next_id().unwrap_pending(), 5);
}

#[test]
fn rollover_resets_the_sequence_on_the_next_millisecond() {
    let time = SteppedTime::new(vec![42, 43]);
    let generator: LockSnowflakeGenerator<SnowflakeId, _> =
        LockSnowflakeGenerator::new(1, time.clone());

    // The first call rolls over from timestamp 0 and issues sequence 0.
    for expected in 0..=SnowflakeId::max_sequence() {
        let id = generator.next_id().unwrap_ready();
        assert_eq!(id.sequence(), expected);
        assert_eq!(id.timestamp(), 42);
    }
    assert_eq!(generator.next_id().unwrap_pending(), 1);

    time.advance();
    let id = generator.next_id().unwrap_ready();
    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 0);
}

#[test]
fn generate_is_monotonic_on_a_real_clock() {
    let ids = IdGenerator::new(1).unwrap();
    let mut last = ids.generate();
    for _ in 0..(4096 * 16) {
        let next = ids.generate();
        assert!(next > last);
        assert_eq!(next.node_id(), 1);
        last = next;
    }
}

#[test]
fn generate_is_unique_across_threads() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 4096 * 8;

    let ids = Arc::new(IdGenerator::with_clock(5, MonotonicClock::new().unwrap()).unwrap());
    let seen = Arc::new(Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD)));

    scope(|s| {
        for _ in 0..THREADS {
            let ids = Arc::clone(&ids);
            let seen = Arc::clone(&seen);
            s.spawn(move || {
                for _ in 0..IDS_PER_THREAD {
                    let id = ids.generate();
                    assert_ne!(id.as_i64(), 0);
                    assert!(seen.lock().unwrap().insert(id));
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), THREADS * IDS_PER_THREAD);
}

#[test]
fn generate_on_the_system_clock() {
    let ids = IdGenerator::with_clock(3, SystemClock::default()).unwrap();
    let now = SystemClock::default().current_millis();

    let mut last = ids.generate();
    assert_eq!(last.node_id(), 3);
    assert!(last.timestamp().abs_diff(now) < 1_000);
    for _ in 0..4096 * 2 {
        let next = ids.generate();
        assert!(next > last);
        last = next;
    }
}

#[cfg(feature = "async-tokio")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn generate_async_is_unique_across_tasks() {
    const TASKS: usize = 8;
    const IDS_PER_TASK: usize = 4096;

    let ids = Arc::new(IdGenerator::new(9).unwrap());
    let tasks: Vec<_> = (0..TASKS)
        .map(|_| {
            let ids = Arc::clone(&ids);
            tokio::spawn(async move {
                let mut out = Vec::with_capacity(IDS_PER_TASK);
                for _ in 0..IDS_PER_TASK {
                    out.push(ids.generate_async().await);
                }
                out
            })
        })
        .collect();

    let mut seen = HashSet::with_capacity(TASKS * IDS_PER_TASK);
    for task in tasks {
        let out = task.await.unwrap();
        assert!(out.windows(2).all(|pair| pair[0] < pair[1]));
        for id in out {
            assert_eq!(id.node_id(), 9);
            assert!(seen.insert(id));
        }
    }
    assert_eq!(seen.len(), TASKS * IDS_PER_TASK);
}

#[test]
fn node_id_must_fit_the_partition() {
    let max = SnowflakeId::max_node_id();
    assert!(IdGenerator::new(max).is_ok());
    assert_eq!(
        IdGenerator::new(max + 1).err(),
        Some(Error::NodeIdOutOfRange {
            node_id: max + 1,
            max
        })
    );
}
