#![cfg(not(loom))]

use std::{collections::HashSet, sync::Arc, thread};

use lockstep::list::FineGrainedList;
use rand::Rng;

#[test]
fn add_find_update_remove() {
    let list = FineGrainedList::new();
    for id in 0..20u32 {
        list.push_front((id, format!("entry-{}", id)));
    }

    assert_eq!(
        Some((7, String::from("entry-7"))),
        list.find_first_if(|(id, _)| *id == 7)
    );

    assert_eq!(
        true,
        list.update_first_if(|(id, _)| *id == 7, |(_, name)| name.push_str("-updated"))
    );
    assert_eq!(
        Some((7, String::from("entry-7-updated"))),
        list.remove_first_if(|(id, _)| *id == 7)
    );
    assert_eq!(None, list.find_first_if(|(id, _)| *id == 7));

    assert_eq!(10, list.remove_if(|(id, _)| id % 2 == 0));
    assert_eq!(9, list.len());
}

#[test]
fn random_concurrent_workload() {
    let list = Arc::new(FineGrainedList::new());

    let handles: Vec<_> = (0..8u32)
        .map(|thread| {
            let c_list = list.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut owned = Vec::new();

                for i in 0..500u32 {
                    let value = thread * 10_000 + i;
                    match rng.gen_range(0..4) {
                        0 | 1 => {
                            c_list.push_front(value);
                            owned.push(value);
                        }
                        2 => {
                            if let Some(target) = owned.pop() {
                                assert_eq!(
                                    Some(target),
                                    c_list.remove_first_if(|entry| *entry == target)
                                );
                            }
                        }
                        _ => {
                            if let Some(target) = owned.last().copied() {
                                assert_eq!(
                                    Some(target),
                                    c_list.find_first_if(|entry| *entry == target)
                                );
                            }
                        }
                    }
                }

                owned
            })
        })
        .collect();

    let expected: HashSet<u32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let actual: HashSet<u32> = list.to_vec().into_iter().collect();

    assert_eq!(expected, actual);
    assert_eq!(expected.len(), list.len());
}

#[test]
fn readers_see_consistent_values() {
    let list = Arc::new(FineGrainedList::new());
    for _ in 0..64 {
        list.push_front((0u64, 0u64));
    }

    // Every Update keeps both Halves equal, which a Reader must always see
    let writers: Vec<_> = (0..4)
        .map(|_| {
            let c_list = list.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    c_list.update_first_if(
                        |_| true,
                        |(left, right)| {
                            *left += 1;
                            *right += 1;
                        },
                    );
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let c_list = list.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    c_list.for_each(|(left, right)| assert_eq!(left, right));
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(Some((2000, 2000)), list.find_first_if(|_| true));
}
