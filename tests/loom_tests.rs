#![cfg(loom)]

use loom::thread;
use turbo_wsq::Worker;

#[test]
fn loom_push_publishes_to_thief() {
    loom::model(|| {
        let worker = Worker::<i32, 4>::new();
        let stealer = worker.stealer();

        let thief = thread::spawn(move || stealer.steal());

        worker.try_push(9).unwrap();
        let stolen = thief.join().unwrap();
        let popped = worker.pop();

        // The single item is taken by exactly one side, never both.
        match (stolen, popped) {
            (Some(9), None) | (None, Some(9)) => {}
            other => panic!("item lost or duplicated: {:?}", other),
        }
    });
}

#[test]
fn loom_last_item_race() {
    loom::model(|| {
        let worker = Worker::<i32, 2>::new();
        let stealer = worker.stealer();
        worker.try_push(7).unwrap();

        let thief = thread::spawn(move || stealer.steal());
        let popped = worker.pop();
        let stolen = thief.join().unwrap();

        let taken = popped.is_some() as usize + stolen.is_some() as usize;
        assert_eq!(taken, 1);
        assert_eq!(worker.pop(), None);
    });
}

#[test]
fn loom_two_thieves_one_item() {
    loom::model(|| {
        let worker = Worker::<i32, 2>::new();
        worker.try_push(1).unwrap();

        let s1 = worker.stealer();
        let s2 = worker.stealer();
        let t1 = thread::spawn(move || s1.steal());
        let t2 = thread::spawn(move || s2.steal());

        let taken = t1.join().unwrap().is_some() as usize + t2.join().unwrap().is_some() as usize;
        assert_eq!(taken, 1);
        assert!(worker.is_empty());
    });
}

#[test]
fn loom_pop_steal_accounting() {
    loom::model(|| {
        let worker = Worker::<i32, 4>::new();
        let stealer = worker.stealer();
        worker.try_push(1).unwrap();
        worker.try_push(2).unwrap();

        let thief = thread::spawn(move || stealer.steal());

        let mut taken = Vec::new();
        while let Some(value) = worker.pop() {
            taken.push(value);
        }
        if let Some(value) = thief.join().unwrap() {
            taken.push(value);
        }

        // Both items come out exactly once, whichever side wins the races.
        taken.sort_unstable();
        assert_eq!(taken, vec![1, 2]);
    });
}

#[test]
fn loom_steal_order_under_pop() {
    loom::model(|| {
        let worker = Worker::<i32, 4>::new();
        let stealer = worker.stealer();
        worker.try_push(1).unwrap();
        worker.try_push(2).unwrap();
        worker.try_push(3).unwrap();

        let thief = thread::spawn(move || {
            let first = stealer.steal();
            let second = stealer.steal();
            (first, second)
        });

        let popped = worker.pop();
        let (first, second) = thief.join().unwrap();

        // Steals move in ascending push order from the top while the owner
        // takes the bottom; with three items none of the claims can collide.
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(popped, Some(3));
        assert!(worker.is_empty());
    });
}
