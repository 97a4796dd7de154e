use crate::section::Section;
use crate::SolveError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use timetable_core::{score, write_schedule_file, Schedule};
use tracing::info;
use types::{CourseId, InputModel, Placement, TimeId};

#[derive(Clone, Debug)]
pub struct SwapConfig {
    pub workers: usize,
    /// Maximum number of distinct sections moved per candidate.
    pub max_depth: usize,
    /// Re-run the whole pass from any improved schedule.
    pub restart: bool,
    pub save_path: Option<PathBuf>,
}

struct SwapShared {
    next: usize,
    best: Schedule,
    fatal: Option<SolveError>,
}

/// Exhaustive bounded-depth improvement search: displace one placement,
/// try every other cell its section allows, displacing whatever sits in
/// the way, and keep any fully reassembled schedule that scores better.
/// Workers split the starting indices between them.
pub fn swap_search(
    model: &InputModel,
    sections: &[Section],
    baseline: &Schedule,
    config: &SwapConfig,
) -> Result<Schedule, SolveError> {
    let mut by_course: Vec<Option<&Section>> = vec![None; model.courses.len()];
    for section in sections {
        by_course[section.course] = Some(section);
    }

    let mut global_best = baseline.clone();
    loop {
        info!(
            max = config.max_depth,
            badness = global_best.badness,
            "starting a swap search pass"
        );
        let start = Instant::now();
        let shared = Mutex::new(SwapShared {
            next: 0,
            best: global_best.clone(),
            fatal: None,
        });

        std::thread::scope(|scope| {
            for _ in 0..config.workers.max(1) {
                let shared = &shared;
                let by_course = &by_course;
                let global_best = &global_best;
                scope.spawn(move || loop {
                    let p = {
                        let mut s = shared.lock();
                        if s.fatal.is_some() || s.next >= global_best.placements.len() {
                            break;
                        }
                        let p = s.next;
                        s.next += 1;
                        p
                    };

                    let Some(candidate) =
                        search_from(model, by_course, global_best, config.max_depth, p)
                    else {
                        continue;
                    };

                    let mut s = shared.lock();
                    if candidate.badness < s.best.badness {
                        info!(badness = candidate.badness, "swapping found a new best score");
                        if let Some(path) = &config.save_path {
                            if let Err(err) =
                                write_schedule_file(model, path, &candidate.placements)
                            {
                                s.fatal = Some(SolveError::Persist(err));
                                break;
                            }
                        }
                        s.best = candidate;
                    }
                });
            }
        });

        let mut shared = shared.into_inner();
        if let Some(err) = shared.fatal.take() {
            return Err(err);
        }
        info!(elapsed = ?start.elapsed(), "swap pass finished");

        if shared.best.badness < global_best.badness {
            global_best = shared.best;
            if config.restart {
                info!("swapping improved the score; starting over from the new schedule");
                continue;
            }
            info!("swapping improved the score");
        }
        return Ok(global_best);
    }
}

// Search everything reachable by first displacing the placement at
// start_index. Returns a strictly better schedule if one was found.
fn search_from(
    model: &InputModel,
    by_course: &[Option<&Section>],
    baseline: &Schedule,
    max_depth: usize,
    start_index: usize,
) -> Option<Schedule> {
    let mut state = SwapState {
        model,
        by_course,
        placements: baseline.placements.clone(),
        grid: vec![vec![None; model.times.len()]; model.rooms.len()],
        displaced: Vec::new(),
        replaced: HashSet::new(),
        best: None,
        best_badness: baseline.badness,
        max_depth,
        start_index,
    };
    for idx in 0..state.placements.len() {
        state.occupy(idx);
    }

    state.displace(start_index);
    state.rec(0);
    state.undisplace(start_index);
    if !state.displaced.is_empty() {
        panic!("swap search leaked a displaced entry");
    }
    state.best
}

struct SwapState<'a> {
    model: &'a InputModel,
    by_course: &'a [Option<&'a Section>],
    placements: Vec<Placement>,
    // placement index currently occupying each cell
    grid: Vec<Vec<Option<usize>>>,
    displaced: Vec<usize>,
    replaced: HashSet<usize>,
    best: Option<Schedule>,
    best_badness: i64,
    max_depth: usize,
    start_index: usize,
}

impl SwapState<'_> {
    fn span_times(&self, course: CourseId, time: TimeId) -> Vec<TimeId> {
        let need = self.model.courses[course].slots_needed(&self.model.times[time]);
        let mut out = vec![time];
        let mut t = time;
        for _ in 1..need {
            match self.model.times[t].next {
                Some(next) => {
                    out.push(next);
                    t = next;
                }
                None => break,
            }
        }
        out
    }

    fn occupy(&mut self, idx: usize) {
        let p = self.placements[idx];
        for t in self.span_times(p.course, p.time) {
            let cell = &mut self.grid[p.room][t];
            if cell.is_some() {
                panic!("swap search put two courses in one cell");
            }
            *cell = Some(idx);
        }
    }

    fn vacate(&mut self, idx: usize) {
        let p = self.placements[idx];
        for t in self.span_times(p.course, p.time) {
            self.grid[p.room][t] = None;
        }
    }

    fn displace(&mut self, idx: usize) {
        self.vacate(idx);
        self.displaced.push(idx);
        self.replaced.insert(idx);
    }

    fn undisplace(&mut self, idx: usize) {
        if self.displaced.pop() != Some(idx) {
            panic!("swap search leaked a displaced entry");
        }
        self.replaced.remove(&idx);
        self.occupy(idx);
    }

    // depth counts displaced sections already put somewhere, so
    // depth + |displaced| is the number of distinct sections moved
    fn rec(&mut self, depth: usize) {
        if depth + self.displaced.len() > self.max_depth {
            return;
        }

        let Some(idx) = self.displaced.pop() else {
            // everything is back on the grid: a complete candidate
            let schedule = score(self.model, &self.placements);
            if schedule.badness < self.best_badness {
                self.best_badness = schedule.badness;
                self.best = Some(schedule);
            }
            if depth < self.max_depth {
                for q in self.start_index + 1..self.placements.len() {
                    if self.replaced.contains(&q) {
                        continue;
                    }
                    self.displace(q);
                    self.rec(depth);
                    self.undisplace(q);
                }
            }
            return;
        };

        let placement = self.placements[idx];
        let section = self.by_course[placement.course].expect("section missing for course");
        for room in 0..self.model.rooms.len() {
            for time in 0..self.model.times.len() {
                if !section.feasible(room, time) {
                    continue;
                }

                // find who is sitting where this section would land; a
                // cell held by an already-moved section is off limits
                let span = self.span_times(placement.course, time);
                let mut in_way: Vec<usize> = Vec::new();
                let mut blocked = false;
                for &t in &span {
                    if let Some(occupant) = self.grid[room][t] {
                        if self.replaced.contains(&occupant) {
                            blocked = true;
                            break;
                        }
                        if !in_way.contains(&occupant) {
                            in_way.push(occupant);
                        }
                    }
                }
                if blocked {
                    continue;
                }

                for &w in &in_way {
                    self.displace(w);
                }
                let old = self.placements[idx];
                self.placements[idx] = Placement {
                    course: placement.course,
                    room,
                    time,
                };
                self.occupy(idx);

                self.rec(depth + 1);

                self.vacate(idx);
                self.placements[idx] = old;
                for &w in in_way.iter().rev() {
                    self.undisplace(w);
                }
            }
        }
        self.displaced.push(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::build_sections;
    use timetable_core::parse_str;

    fn config(max_depth: usize) -> SwapConfig {
        SwapConfig {
            workers: 2,
            max_depth,
            restart: false,
            save_path: None,
        }
    }

    #[test]
    fn single_relocation_fixes_bad_time() {
        let m = parse_str(
            "swap1.txt",
            "\
room: R1
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: A R1 MW0900 MW1000:20
",
        )
        .unwrap();
        let sections = build_sections(&m).unwrap();
        let baseline = score(
            &m,
            &[Placement {
                course: 0,
                room: 0,
                time: 1,
            }],
        );
        assert_eq!(baseline.badness, 20);

        let best = swap_search(&m, &sections, &baseline, &config(1)).unwrap();
        assert_eq!(best.badness, 0);
        assert_eq!(best.placements[0].time, 0);
    }

    #[test]
    fn pair_swap_needs_depth_two() {
        let m = parse_str(
            "swap2.txt",
            "\
room: R1
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: A R1 MW0900 MW1000:20
instructor: Bob mw
course: B R1 MW1000 MW0900:20
",
        )
        .unwrap();
        let sections = build_sections(&m).unwrap();
        // both courses sit on their disliked times, and the only fix is
        // to exchange them
        let baseline = score(
            &m,
            &[
                Placement {
                    course: 0,
                    room: 0,
                    time: 1,
                },
                Placement {
                    course: 1,
                    room: 0,
                    time: 0,
                },
            ],
        );
        assert_eq!(baseline.badness, 40);

        let shallow = swap_search(&m, &sections, &baseline, &config(1)).unwrap();
        assert_eq!(shallow.badness, 40);

        let deep = swap_search(&m, &sections, &baseline, &config(2)).unwrap();
        assert_eq!(deep.badness, 0);
        let a = deep.placements.iter().find(|p| p.course == 0).unwrap();
        let b = deep.placements.iter().find(|p| p.course == 1).unwrap();
        assert_eq!((a.time, b.time), (0, 1));
    }

    #[test]
    fn moves_at_most_max_depth_courses() {
        let m = parse_str(
            "swap3.txt",
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
instructor: Carol mw
course: C R1 R2
",
        )
        .unwrap();
        let sections = build_sections(&m).unwrap();
        let placements = vec![
            Placement {
                course: 0,
                room: 0,
                time: 0,
            },
            Placement {
                course: 1,
                room: 0,
                time: 1,
            },
            Placement {
                course: 2,
                room: 0,
                time: 2,
            },
        ];
        let baseline = score(&m, &placements);
        let best = swap_search(&m, &sections, &baseline, &config(1)).unwrap();
        let moved = best
            .placements
            .iter()
            .zip(&placements)
            .filter(|(a, b)| a != b)
            .count();
        assert!(moved <= 1, "depth 1 moved {} courses", moved);
    }
}
