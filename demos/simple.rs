//! Simple usage example

use std::thread;
use turbo_wsq::Worker;

fn main() {
    println!("Turbo WSQ - Simple Example\n");

    // Create a deque with 16 slots; the owner keeps the Worker handle
    let worker = Worker::<String, 16>::new();
    let stealer = worker.stealer();

    // Thief thread takes tasks from the top end
    let thief = thread::spawn(move || {
        let mut stolen = 0;
        while stolen < 5 {
            match stealer.steal() {
                Some(task) => {
                    println!("Stolen: {}", task);
                    stolen += 1;
                }
                None => {
                    // Deque is empty, spin and retry
                    std::hint::spin_loop();
                }
            }
        }
        println!("Thief finished!");
    });

    // Owner thread pushes tasks at the bottom end
    for i in 0..10 {
        let task = format!("Task {}", i);
        println!("Pushing: {}", task);
        worker.push(task);

        // Small delay to make output readable
        thread::sleep(std::time::Duration::from_millis(100));
    }

    thief.join().unwrap();

    // The owner drains whatever the thief left, newest first
    let mut local = 0;
    while let Some(task) = worker.pop() {
        println!("Popped: {}", task);
        local += 1;
    }
    println!("Owner drained {} remaining tasks", local);

    println!("\nExample completed successfully!");
}
