use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use turbo_wsq::Worker;

const MESSAGES: usize = 1_000_000;
const BUFFER_SIZE: usize = 1024;

fn main() {
    println!("Turbo WSQ Performance Test");
    println!("==============================\n");

    println!("Owner only, push/pop ({} messages):", MESSAGES);
    let start = Instant::now();
    test_owner_only();
    report(start.elapsed());

    println!("1 Worker, 1 Thief ({} messages):", MESSAGES);
    let start = Instant::now();
    test_1w_1t();
    report(start.elapsed());

    println!("1 Worker, 4 Thieves ({} messages):", MESSAGES);
    let start = Instant::now();
    test_1w_4t();
    report(start.elapsed());
}

fn report(elapsed: std::time::Duration) {
    let throughput = MESSAGES as f64 / elapsed.as_secs_f64();
    println!("  Time: {:?}", elapsed);
    println!("  Throughput: {:.2} msgs/sec", throughput);
    println!(
        "  Latency: {:.0} ns/op\n",
        elapsed.as_nanos() as f64 / MESSAGES as f64
    );
}

fn test_owner_only() {
    let worker = Worker::<usize, BUFFER_SIZE>::new();

    for _ in 0..(MESSAGES / BUFFER_SIZE) {
        for i in 0..BUFFER_SIZE {
            worker.push(i);
        }
        while worker.pop().is_some() {}
    }
}

fn test_1w_1t() {
    let worker = Worker::<usize, BUFFER_SIZE>::new();
    let stealer = worker.stealer();

    let thief = thread::spawn(move || {
        let mut got = 0usize;
        while got < MESSAGES {
            if stealer.steal().is_some() {
                got += 1;
            } else {
                std::hint::spin_loop();
            }
        }
    });

    for i in 0..MESSAGES {
        worker.push(i);
    }
    thief.join().unwrap();
}

fn test_1w_4t() {
    const THIEVES: usize = 4;

    let worker = Worker::<usize, BUFFER_SIZE>::new();
    let consumed = Arc::new(AtomicUsize::new(0));
    let mut thieves = Vec::new();

    for _ in 0..THIEVES {
        let stealer = worker.stealer();
        let consumed = consumed.clone();
        thieves.push(thread::spawn(move || {
            while consumed.load(Ordering::Relaxed) < MESSAGES {
                if stealer.steal().is_some() {
                    consumed.fetch_add(1, Ordering::Relaxed);
                } else {
                    std::hint::spin_loop();
                }
            }
        }));
    }

    for i in 0..MESSAGES {
        worker.push(i);
    }
    for t in thieves {
        t.join().unwrap();
    }
}
