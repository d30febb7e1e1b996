//! Worker threads draining a shared stack of boxed tasks.

use kalkan::Config;
use kalkan_stack::Stack;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

type Task = Box<dyn FnOnce() + Send>;

const WORKERS: usize = 4;
const TASKS: usize = 1_000;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = Config::new().with_max_threads(WORKERS);
    let stack: Arc<Stack<Task>> = Arc::new(Stack::with_config(config).expect("valid config"));
    let done = Arc::new(AtomicUsize::new(0));

    for i in 0..TASKS {
        let done = done.clone();
        stack.push(Box::new(move || {
            std::hint::black_box(i * i);
            done.fetch_add(1, Ordering::Relaxed);
        }));
    }

    let workers: Vec<_> = (0..WORKERS)
        .map(|id| {
            let stack = stack.clone();
            thread::spawn(move || {
                let handle = stack.handle();
                let mut ran = 0;
                while let Some(task) = handle.pop() {
                    task();
                    ran += 1;
                }
                println!("worker {id} ran {ran} tasks");
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    let stats = stack.domain().stats();
    println!(
        "{} tasks done, {} nodes retired, {} reclaimed",
        done.load(Ordering::Relaxed),
        stats.retired,
        stats.reclaimed
    );
    assert_eq!(done.load(Ordering::Relaxed), TASKS);
}
