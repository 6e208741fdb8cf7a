use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use turbo_wsq::Worker;

fn main() {
    println!("Work Stealing Example\n");

    const NUM_THIEVES: usize = 4;
    const NUM_JOBS: usize = 1000;

    let worker = Worker::<usize, 128>::new();
    let done = Arc::new(AtomicUsize::new(0));

    let mut thieves = vec![];
    for thief_id in 0..NUM_THIEVES {
        let stealer = worker.stealer();
        let done = done.clone();

        thieves.push(thread::spawn(move || {
            let mut stolen = 0usize;
            while done.load(Ordering::SeqCst) < NUM_JOBS {
                if stealer.steal().is_some() {
                    stolen += 1;
                    done.fetch_add(1, Ordering::SeqCst);
                } else {
                    std::hint::spin_loop();
                }
            }
            println!("🔨 Thief {} stole {} jobs", thief_id, stolen);
            stolen
        }));
    }

    // The owner enqueues jobs and keeps some for itself, newest first
    let mut local = 0usize;
    for job in 0..NUM_JOBS {
        worker.push(job);
        if job % 2 == 0 && worker.pop().is_some() {
            local += 1;
            done.fetch_add(1, Ordering::SeqCst);
        }
    }

    // Help drain the backlog until every job is accounted for
    while done.load(Ordering::SeqCst) < NUM_JOBS {
        if worker.pop().is_some() {
            local += 1;
            done.fetch_add(1, Ordering::SeqCst);
        }
    }

    let mut stolen_total = 0usize;
    for t in thieves {
        stolen_total += t.join().unwrap();
    }

    println!("✨ Owner processed {} jobs locally", local);
    println!("✨ Thieves stole {} jobs", stolen_total);
    println!("✅ Total: {} of {}", local + stolen_total, NUM_JOBS);
}
