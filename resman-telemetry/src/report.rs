//! Text rendering of the periodic tables and the end-of-run statistics.

use std::fmt::Write;

use resman_core::snapshot::SystemSnapshot;
use resman_core::stats::AllocationStats;
use resman_core::types::SimTime;

/// Process table followed by the held-units matrix and the available row.
pub fn render_tables(snapshot: &SystemSnapshot, now: SimTime) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Clock {now}\nProcess Table:");
    let _ = writeln!(out, "Entry\tOccupied\tPID\tStartS\tStartNs");
    for process in &snapshot.processes {
        let _ = writeln!(
            out,
            "{}\t1\t\t{}\t{}\t{}",
            process.slot.as_usize(),
            process.identity.0,
            process.start_time.seconds(),
            process.start_time.subsec_nanos()
        );
    }
    out.push('\n');

    let _ = writeln!(out, "Current system resources");
    out.push('\t');
    for resource in &snapshot.resources {
        let _ = write!(out, "{}\t", resource.resource);
    }
    out.push('\n');
    for process in &snapshot.processes {
        let _ = write!(out, "{}\t", process.slot);
        for held in &process.held {
            let _ = write!(out, "{held}\t");
        }
        out.push('\n');
    }
    out.push_str("Avail\t");
    for resource in &snapshot.resources {
        let _ = write!(out, "{}\t", resource.available);
    }
    out.push('\n');

    for resource in snapshot.resources.iter().filter(|r| !r.waiting.is_empty()) {
        let waiting: Vec<String> = resource.waiting.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "{} wait queue: {}", resource.resource, waiting.join(", "));
    }
    out
}

pub fn render_final_statistics(stats: &AllocationStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run statistics:");
    let _ = writeln!(out, "  Requests granted immediately:     {}", stats.immediate_grants());
    let _ = writeln!(out, "  Requests granted after waiting:   {}", stats.deferred_grants());
    let _ = writeln!(out, "  Processes terminated normally:    {}", stats.normal_terminations());
    let _ = writeln!(out, "  Deadlock detection runs:          {}", stats.detection_runs());
    let _ = writeln!(out, "  Runs that found a deadlock:       {}", stats.deadlock_detections());
    let _ = writeln!(out, "  Processes killed by recovery:     {}", stats.victims_killed());
    let _ = writeln!(out, "  Processes found deadlocked:       {}", stats.stuck_processes());
    let _ = writeln!(
        out,
        "  Deadlocked processes killed:      {:.2}%",
        stats.kill_percentage()
    );
    out
}
