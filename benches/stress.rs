use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use fabhub::engine::{Engine, ScheduleFilter};
use fabhub::model::*;

const H: Ms = 3_600_000; // 1 hour in ms
const DAY: Ms = 1_735_689_600_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_wal_path() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("fabhub_bench");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("stress_{}.wal", Ulid::new()))
}

fn draft(machine: &MachineState, start: Ms, end: Ms) -> ScheduleDraft {
    ScheduleDraft {
        start_date: start,
        end_date: end,
        machine: machine.reference(),
        fablab_id: machine.fablab_id.clone(),
        order_id: Ulid::new(),
    }
}

async fn setup(engine: &Engine, count: usize) -> Vec<MachineState> {
    let mut machines = Vec::with_capacity(count);
    for i in 0..count {
        let m = engine
            .create_machine(MachineDraft {
                machine_type: MachineType::Printer,
                fablab_id: "fablab-1".into(),
                device_name: format!("printer-{i}"),
                manufacturer: None,
                activated: true,
            })
            .await
            .unwrap();
        machines.push(m);
    }
    println!("  created {} machines", machines.len());
    machines
}

/// Sequential non-overlapping bookings on one machine. The conflict scan is
/// linear in the machine's booking count, so latency drifts up as the
/// machine fills — the percentile spread shows by how much.
async fn phase1_sequential(engine: &Engine, machine: &MachineState) {
    let mut latencies = Vec::with_capacity(1000);
    for slot in 0..1000 {
        let d = draft(machine, DAY + slot * H, DAY + slot * H + H / 2);
        let start = Instant::now();
        engine.create_schedule(d).await.unwrap();
        latencies.push(start.elapsed());
    }
    print_latency("phase 1: sequential creates, one machine", &mut latencies);
}

/// Parallel bookings across independent machines — no lock contention, the
/// group-commit WAL writer is the only shared path.
async fn phase2_parallel(engine: &Arc<Engine>, machines: &[MachineState]) {
    let mut handles = Vec::new();
    for machine in machines.iter().cloned() {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(200);
            for slot in 0..200 {
                let d = draft(&machine, DAY + slot * H, DAY + slot * H + H / 2);
                let start = Instant::now();
                engine.create_schedule(d).await.unwrap();
                latencies.push(start.elapsed());
            }
            latencies
        }));
    }
    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    print_latency("phase 2: parallel creates, independent machines", &mut all);
}

/// Everyone fights over one machine's slots: half the attempts target
/// already-booked intervals and must be rejected.
async fn phase3_contention(engine: &Arc<Engine>, machine: &MachineState) {
    let mut handles = Vec::new();
    for task in 0..8u32 {
        let engine = engine.clone();
        let machine = machine.clone();
        handles.push(tokio::spawn(async move {
            let mut conflicts = 0usize;
            for slot in 0..100 {
                // Even tasks and odd tasks target the same slots
                let base = DAY + 2000 * H + (slot * 2 + (task % 2) as Ms) * H;
                if engine.create_schedule(draft(&machine, base, base + H)).await.is_err() {
                    conflicts += 1;
                }
            }
            conflicts
        }));
    }
    let mut conflicts = 0;
    for h in handles {
        conflicts += h.await.unwrap();
    }
    println!("  phase 3: contended creates, one machine: {conflicts}/800 rejected");
}

/// Read mix: machine fetches plus filtered schedule listings.
async fn phase4_reads(engine: &Engine, machines: &[MachineState]) {
    let mut latencies = Vec::with_capacity(1000);
    for i in 0..1000 {
        let m = &machines[i % machines.len()];
        let start = Instant::now();
        let state = engine.get_machine(m.id).await.unwrap();
        let filter = ScheduleFilter {
            machine_id: Some(state.id),
            ..Default::default()
        };
        let listed = engine.list_schedules(&filter, Some(50), Some(0));
        assert!(listed.len() <= 50);
        latencies.push(start.elapsed());
    }
    print_latency("phase 4: read mix", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("fabhub stress bench");
    let engine = Arc::new(Engine::new(bench_wal_path()).unwrap());
    let machines = setup(&engine, 10).await;

    phase1_sequential(&engine, &machines[0]).await;
    phase2_parallel(&engine, &machines[1..]).await;
    phase3_contention(&engine, &machines[0]).await;
    phase4_reads(&engine, &machines).await;
}
