use std::sync::{Arc, Mutex};

use criterion::{black_box, Criterion};

use lockstep::stack::LockFreeStack;

pub fn push_pop(ctx: &mut Criterion) {
    ctx.bench_function("stack-push-pop", |b| {
        let stack = LockFreeStack::<u64>::new();

        b.iter(|| {
            stack.push(black_box(13));
            assert_eq!(Some(13), stack.pop());
        });
    });
}

pub fn std_push_pop(ctx: &mut Criterion) {
    ctx.bench_function("std-mutex-vec-push-pop", |b| {
        let stack = Mutex::new(Vec::<u64>::new());

        b.iter(|| {
            stack.lock().unwrap().push(black_box(13));
            assert_eq!(Some(13), stack.lock().unwrap().pop());
        });
    });
}

pub fn concurrent_push_pop(ctx: &mut Criterion) {
    let mut group = ctx.benchmark_group("stack-concurrent-push-pop");

    for threads in [2u64, 4, 8] {
        group.bench_function(format!("threads-{}", threads), |b| {
            b.iter(|| {
                let stack = Arc::new(LockFreeStack::new());

                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let c_stack = stack.clone();
                        std::thread::spawn(move || {
                            for i in 0..1000u64 {
                                c_stack.push(i);
                                c_stack.pop();
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
}
