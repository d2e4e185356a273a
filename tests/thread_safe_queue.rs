#![cfg(not(loom))]

use std::{
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use lockstep::queues::ThreadSafeQueue;

#[test]
fn empty_after_construction_and_push_pop() {
    let queue = ThreadSafeQueue::new();
    assert_eq!(true, queue.is_empty());

    queue.push(String::from("value"));
    assert_eq!(false, queue.is_empty());

    assert_eq!(Some(String::from("value")), queue.try_pop());
    assert_eq!(true, queue.is_empty());
}

#[test]
fn single_producer_consumer_fifo() {
    let queue = Arc::new(ThreadSafeQueue::new());

    let c_queue = queue.clone();
    let producer = thread::spawn(move || {
        for value in 0..10_000u32 {
            c_queue.push(value);
        }
    });

    for expected in 0..10_000u32 {
        assert_eq!(expected, queue.wait_and_pop());
    }
    producer.join().unwrap();

    assert_eq!(None, queue.try_pop());
}

#[test]
fn wait_and_pop_before_push() {
    let queue = Arc::new(ThreadSafeQueue::new());
    let (tx, rx) = mpsc::channel();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let c_queue = queue.clone();
            let c_tx = tx.clone();
            thread::spawn(move || {
                c_tx.send(c_queue.wait_and_pop()).unwrap();
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    assert!(rx.try_recv().is_err());

    queue.push(1u8);
    queue.push(2u8);

    let mut received = vec![
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
    ];
    received.sort_unstable();
    assert_eq!(vec![1, 2], received);

    for handle in consumers {
        handle.join().unwrap();
    }
}

#[test]
fn per_producer_order_preserved() {
    let queue = Arc::new(ThreadSafeQueue::new());

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let c_queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..1000u32 {
                    c_queue.push((producer, seq));
                }
            })
        })
        .collect();

    let mut last_seen = [None::<u32>; 4];
    for _ in 0..4000 {
        let (producer, seq) = queue.wait_and_pop();
        let last = &mut last_seen[producer as usize];
        assert!(last.map_or(true, |last| last < seq));
        *last = Some(seq);
    }

    for handle in producers {
        handle.join().unwrap();
    }
    assert_eq!([Some(999); 4], last_seen);
}
