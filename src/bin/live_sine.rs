//! Minimal live session against the default audio device: play a sine,
//! hot-swap the patch once, stop.

use std::time::Duration;

use liveloop::{open_default, GlicolContext, LiveWorker, WorkerEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (sink, stream) = open_default()?;
    let sample_rate = stream.sample_rate();

    let mut worker = LiveWorker::new(
        move |unit: &liveloop::CodeUnit| {
            GlicolContext::open(unit.name(), unit.source_text(), sample_rate)
        },
        sink,
    );
    let events = worker.events();

    worker.initialize("live-sine", "out: sin 440 >> mul 0.3")?;
    worker.start()?;
    std::thread::sleep(Duration::from_secs(2));

    worker.submit_code("out: sin 220 >> mul 0.3")?;
    std::thread::sleep(Duration::from_secs(2));

    worker.terminate();
    worker.join();

    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::Done { last_output, .. } => println!("done: {last_output}"),
            WorkerEvent::Error { diagnostic, .. } => eprintln!("error: {diagnostic}"),
        }
    }
    Ok(())
}
