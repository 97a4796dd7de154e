use crate::place::place_sections;
use crate::section::Section;
use crate::SolveError;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use timetable_core::{score, write_schedule_file, Schedule};
use tracing::info;
use types::{InputModel, Placement};

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct OptimizeConfig {
    pub workers: usize,
    /// Mean percent chance that a baseline placement is kept.
    pub pin: f64,
    pub pin_dev: f64,
    /// Total search budget.
    pub duration: Duration,
    pub warmup: Duration,
    pub restart_local: Duration,
    pub restart_global: Duration,
    pub weighted_warmup: bool,
    pub weighted_optimization: bool,
    pub seed: u64,
    /// Where to persist each new global best, if anywhere.
    pub save_path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OptimizeStats {
    pub successful: u64,
    pub failed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Warmup,
    LocalBest,
    GlobalBest,
}

struct Shared {
    mode: Mode,
    baseline: Vec<Placement>,
    local_best: Option<Schedule>,
    global_best: Option<Schedule>,
    last_improvement: Instant,
    last_report: Instant,
    stats: OptimizeStats,
    fatal: Option<SolveError>,
}

/// Generate-and-refine driver: workers repeatedly clone the section
/// matrices, build a schedule biased toward the shared baseline, score
/// it, and merge the result under one lock. Warmup collects a starting
/// point, refinement mimics the best schedule so far, and stretches
/// without improvement trigger a full restart.
pub fn optimize(
    model: &InputModel,
    sections: &[Section],
    config: &OptimizeConfig,
) -> Result<(Schedule, OptimizeStats), SolveError> {
    let start = Instant::now();
    let normal = if config.pin > 0.0 && config.pin < 100.0 {
        Some(Normal::new(config.pin, config.pin_dev).expect("invalid pin deviation"))
    } else {
        None
    };

    let shared = Mutex::new(Shared {
        mode: Mode::Warmup,
        baseline: Vec::new(),
        local_best: None,
        global_best: None,
        last_improvement: start,
        last_report: start,
        stats: OptimizeStats::default(),
        fatal: None,
    });

    info!(
        workers = config.workers,
        pin = config.pin,
        pindev = config.pin_dev,
        "starting main search"
    );

    std::thread::scope(|scope| {
        for worker in 0..config.workers.max(1) {
            let shared = &shared;
            scope.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(worker as u64));
                while start.elapsed() < config.duration {
                    let Some((base, weighted)) = check_in(config, shared) else {
                        break;
                    };

                    let local_pin = sample_pin(config, normal, &mut rng);
                    let Some(placements) =
                        place_sections(model, sections, &base, local_pin, weighted, &mut rng)
                    else {
                        shared.lock().stats.failed += 1;
                        continue;
                    };

                    let schedule = score(model, &placements);
                    if !merge(model, config, shared, &base, local_pin, schedule) {
                        break;
                    }
                }
            });
        }
    });

    let mut shared = shared.into_inner();
    if let Some(err) = shared.fatal.take() {
        return Err(err);
    }
    let stats = shared.stats;
    info!(
        successful = stats.successful,
        failed = stats.failed,
        elapsed = ?start.elapsed(),
        "search finished"
    );
    let best = shared.global_best.ok_or(SolveError::NoSchedule)?;
    Ok((best, stats))
}

// Read the shared state, applying any due mode transition, and snapshot
// what this attempt needs. None tells the worker to shut down.
fn check_in(config: &OptimizeConfig, shared: &Mutex<Shared>) -> Option<(Vec<Placement>, bool)> {
    let mut s = shared.lock();
    if s.fatal.is_some() {
        return None;
    }
    let now = Instant::now();
    if now.duration_since(s.last_report) >= REPORT_INTERVAL {
        s.last_report += REPORT_INTERVAL;
        info!(
            runs = s.stats.successful + s.stats.failed,
            badness = s.global_best.as_ref().map_or(-1, |b| b.badness),
            "still searching"
        );
    }

    match s.mode {
        Mode::Warmup => {
            if now.duration_since(s.last_improvement) >= config.warmup {
                let promoted = match &s.local_best {
                    Some(best) => best.placements.clone(),
                    None => {
                        s.fatal = Some(SolveError::NoSchedule);
                        return None;
                    }
                };
                s.baseline = promoted;
                s.last_improvement = now;
                s.mode = Mode::LocalBest;
                info!("ending warmup");
            }
        }
        Mode::LocalBest if now.duration_since(s.last_improvement) >= config.restart_local => {
            restart(&mut s, now);
        }
        Mode::GlobalBest if now.duration_since(s.last_improvement) >= config.restart_global => {
            restart(&mut s, now);
        }
        _ => {}
    }

    let weighted = match s.mode {
        Mode::Warmup => config.weighted_warmup,
        _ => config.weighted_optimization,
    };
    Some((s.baseline.clone(), weighted))
}

fn restart(s: &mut Shared, now: Instant) {
    s.baseline.clear();
    s.local_best = None;
    s.last_improvement = now;
    s.mode = Mode::Warmup;
    info!("restarting");
}

fn sample_pin<R: Rng>(config: &OptimizeConfig, normal: Option<Normal<f64>>, rng: &mut R) -> f64 {
    match normal {
        None => config.pin.clamp(0.0, 100.0),
        Some(dist) => loop {
            let pin = dist.sample(rng);
            if (0.0..100.0).contains(&pin) {
                break pin;
            }
        },
    }
}

// Fold one scored attempt into the shared record. Returns false when the
// worker should shut down.
fn merge(
    model: &InputModel,
    config: &OptimizeConfig,
    shared: &Mutex<Shared>,
    base: &[Placement],
    local_pin: f64,
    schedule: Schedule,
) -> bool {
    let mut s = shared.lock();
    s.stats.successful += 1;
    let now = Instant::now();
    let global = s.global_best.as_ref().map_or(i64::MAX, |b| b.badness);
    let local = s.local_best.as_ref().map_or(i64::MAX, |b| b.badness);

    if schedule.badness < global {
        if s.mode == Mode::Warmup {
            info!(badness = schedule.badness, "global best found in warmup");
        } else {
            s.baseline = schedule.placements.clone();
            s.last_improvement = now;
            s.mode = Mode::GlobalBest;
            info!(
                badness = schedule.badness,
                pin = local_pin,
                "global best found"
            );
        }
        if let Some(path) = &config.save_path {
            if let Err(err) = write_schedule_file(model, path, &schedule.placements) {
                s.fatal = Some(SolveError::Persist(err));
                return false;
            }
        }
        s.local_best = Some(schedule.clone());
        s.global_best = Some(schedule);
    } else if schedule.badness < local {
        match s.mode {
            // a holdover scored against a baseline from before a
            // restart; discard it
            Mode::Warmup if !base.is_empty() => {}
            Mode::Warmup => {
                info!(
                    badness = schedule.badness,
                    global = global,
                    "warmup best found"
                );
                s.local_best = Some(schedule);
            }
            _ => {
                s.baseline = schedule.placements.clone();
                s.last_improvement = now;
                info!(
                    badness = schedule.badness,
                    pin = local_pin,
                    global = global,
                    "local best found"
                );
                s.local_best = Some(schedule);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::build_sections;
    use timetable_core::parse_str;

    fn config(ms: u64) -> OptimizeConfig {
        OptimizeConfig {
            workers: 2,
            pin: 95.0,
            pin_dev: 5.0,
            duration: Duration::from_millis(ms),
            warmup: Duration::from_millis(20),
            restart_local: Duration::from_millis(50),
            restart_global: Duration::from_millis(80),
            weighted_warmup: false,
            weighted_optimization: false,
            seed: 42,
            save_path: None,
        }
    }

    #[test]
    fn finds_a_clean_schedule() {
        let m = parse_str(
            "opt.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
time: MW1100 mw
instructor: Alice mw
course: A R1 R2
instructor: Bob mw
course: B R1 R2
",
        )
        .unwrap();
        let sections = build_sections(&m).unwrap();
        let (best, stats) = optimize(&m, &sections, &config(200)).unwrap();
        assert_eq!(best.badness, 0);
        assert_eq!(best.placements.len(), 2);
        assert!(stats.successful > 0);
    }

    #[test]
    fn reports_empty_warmup() {
        // both courses demand the same single cell, so every attempt dies
        let m = parse_str(
            "dead.txt",
            "\
room: R1
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: A R1 MW0900
instructor: Bob mw
course: B R1 MW0900
",
        )
        .unwrap();
        let sections = build_sections(&m).unwrap();
        let err = optimize(&m, &sections, &config(500)).unwrap_err();
        assert!(matches!(err, SolveError::NoSchedule));
    }
}
