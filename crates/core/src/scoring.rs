use crate::grid::Grid;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use types::{available, Badness, InputModel, Placement, RoomId, TimeId};

/// Sentinel added to the total for any problem outside the soft range.
pub const IMPOSSIBLE: i32 = 1_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Problem {
    pub message: String,
    pub badness: i32,
}

#[derive(Clone, Debug)]
pub struct Schedule {
    pub placements: Vec<Placement>,
    pub grid: Grid,
    pub problems: Vec<Problem>,
    pub badness: i64,
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// clamp a stored preference into a reportable problem badness
fn normalize(badness: Badness) -> i32 {
    if available(badness) {
        badness
    } else {
        IMPOSSIBLE
    }
}

enum DaySide {
    Mw,
    Tr,
}

enum HalfSide {
    Am,
    Pm,
}

// a time counts toward section distribution when it is a regular daytime
// slot: an mw/tr day, a 4-digit HHMM, and no later than 16:30
fn countable(model: &InputModel, t: TimeId) -> Option<(DaySide, HalfSide)> {
    let time = &model.times[t];
    let side = match time.day().as_str() {
        "mw" => DaySide::Mw,
        "tr" => DaySide::Tr,
        _ => return None,
    };
    let hour = time.hour()?;
    if hour > "1630" {
        return None;
    }
    let half = if hour < "1200" {
        HalfSide::Am
    } else {
        HalfSide::Pm
    };
    Some((side, half))
}

pub fn score(model: &InputModel, placements: &[Placement]) -> Schedule {
    let grid = Grid::build(model, placements);
    let mut problems: Vec<Problem> = Vec::new();

    // walk every occupied cell, then every same-time pair of cells
    for t in 0..model.times.len() {
        for room_a in 0..model.rooms.len() {
            let cell_a = grid.cells[room_a][t];
            let Some(course_a) = cell_a.course else { continue };
            let a = &model.courses[course_a];

            for &ins in &a.instructors {
                let instructor = &model.instructors[ins];
                let badness = instructor.times[t];
                if badness > 0 && badness < 100 {
                    problems.push(Problem {
                        message: format!(
                            "instructor time preference: {} has {} scheduled at {} (badness {})",
                            instructor.name, a.name, model.times[t].name, badness
                        ),
                        badness,
                    });
                } else if badness != 0 {
                    problems.push(Problem {
                        message: format!(
                            "instructor not available: {} has {} scheduled at {} (badness {})",
                            instructor.name, a.name, model.times[t].name, IMPOSSIBLE
                        ),
                        badness: IMPOSSIBLE,
                    });
                }
            }

            if !a.times.is_empty() && !cell_a.spillover && a.times[t] != 0 {
                let badness = normalize(a.times[t]);
                problems.push(Problem {
                    message: format!(
                        "course time preference: {} should not be scheduled at {} (badness {})",
                        a.name, model.times[t].name, badness
                    ),
                    badness,
                });
            }

            if !cell_a.spillover && a.rooms[room_a] != 0 {
                let badness = normalize(a.rooms[room_a]);
                problems.push(Problem {
                    message: format!(
                        "course room preference: {} should not be scheduled in {} (badness {})",
                        a.name, model.rooms[room_a].name, badness
                    ),
                    badness,
                });
            }

            for room_b in room_a + 1..model.rooms.len() {
                let cell_b = grid.cells[room_b][t];
                let Some(course_b) = cell_b.course else { continue };
                let b = &model.courses[course_b];
                if cell_a.spillover && cell_b.spillover {
                    continue;
                }

                // the generator never does this, but a user-proposed
                // schedule might
                for &ins in &a.instructors {
                    if b.instructors.contains(&ins) {
                        let mut names = [a.name.as_str(), b.name.as_str()];
                        names.sort();
                        problems.push(Problem {
                            message: format!(
                                "instructor double booked: {} has courses {} and {} at {} (badness {})",
                                model.instructors[ins].name,
                                names[0],
                                names[1],
                                model.times[t].name,
                                IMPOSSIBLE
                            ),
                            badness: IMPOSSIBLE,
                        });
                    }
                }

                if let Some(&conflict) = a.conflicts.get(&course_b) {
                    let badness = normalize(conflict);
                    let mut names = [a.name.as_str(), b.name.as_str()];
                    names.sort();
                    problems.push(Problem {
                        message: format!(
                            "curriculum conflict: {} and {} both meet at {} (badness {})",
                            names[0], names[1], model.times[t].name, badness
                        ),
                        badness,
                    });
                }

                if a.name == b.name {
                    problems.push(Problem {
                        message: format!(
                            "curriculum conflict: {} has two sections meeting at {} (badness 40)",
                            a.name, model.times[t].name
                        ),
                        badness: 40,
                    });
                }
            }
        }
    }

    // anti-conflicts: every pair of named courses should have sections
    // starting together; overlapping rules keep the worst badness per pair
    if !model.anti_conflicts.is_empty() {
        let mut starts: HashMap<&str, HashSet<TimeId>> = HashMap::new();
        for p in placements {
            starts
                .entry(model.courses[p.course].name.as_str())
                .or_default()
                .insert(p.time);
        }
        let mut pairs: HashMap<(&str, &str), Badness> = HashMap::new();
        for rule in &model.anti_conflicts {
            for (a, b) in rule.names.iter().tuple_combinations() {
                let key = if a <= b {
                    (a.as_str(), b.as_str())
                } else {
                    (b.as_str(), a.as_str())
                };
                let entry = pairs.entry(key).or_insert(rule.badness);
                *entry = types::worst(*entry, rule.badness);
            }
        }
        for ((a, b), badness) in pairs {
            let satisfied = match (starts.get(a), starts.get(b)) {
                (Some(sa), Some(sb)) => sa.iter().any(|t| sb.contains(t)),
                _ => false,
            };
            if !satisfied {
                let badness = normalize(badness);
                problems.push(Problem {
                    message: format!(
                        "anticonflict: {} and {} should have sections meeting at the same time (badness {})",
                        a, b, badness
                    ),
                    badness,
                });
            }
        }
    }

    let times_per_day = model.times_per_day();
    let mut by_instructor: HashMap<usize, Vec<Placement>> = HashMap::new();
    let mut by_course_name: HashMap<&str, Vec<Placement>> = HashMap::new();
    for p in placements {
        for &ins in &model.courses[p.course].instructors {
            by_instructor.entry(ins).or_default().push(*p);
        }
        by_course_name
            .entry(model.courses[p.course].name.as_str())
            .or_default()
            .push(*p);
    }

    for ins in 0..model.instructors.len() {
        let Some(list) = by_instructor.get_mut(&ins) else {
            continue;
        };
        list.sort_by_key(|p| p.time);
        let instructor = &model.instructors[ins];

        let mut in_room: HashSet<RoomId> = HashSet::new();
        let mut on_day: HashMap<String, Vec<Placement>> = HashMap::new();
        for p in list.iter() {
            in_room.insert(p.room);
            let day = model.times[p.time].day();
            if times_per_day.get(&day).copied().unwrap_or(0) > 1 {
                on_day.entry(day).or_default().push(*p);
            }
        }

        if in_room.len() > instructor.min_rooms {
            let extra = in_room.len() - instructor.min_rooms;
            let badness = (extra * extra) as i32;
            problems.push(Problem {
                message: format!(
                    "instructor convenience: {} is spread across more rooms than necessary (badness {})",
                    instructor.name, badness
                ),
                badness,
            });
        }

        if on_day.len() > 1 {
            let (min, max) = on_day
                .values()
                .map(|classes| classes.len())
                .minmax()
                .into_option()
                .unwrap();
            if max - min > 1 {
                let gap = max - min;
                let badness = (gap * gap * 4) as i32;
                problems.push(Problem {
                    message: format!(
                        "instructor convenience: {} has more classes on some days than others (badness {})",
                        instructor.name, badness
                    ),
                    badness,
                });
            }
        }

        if instructor.days > 0 && on_day.len() != instructor.days {
            let gap = instructor.days.abs_diff(on_day.len());
            let mut badness = (10 * gap) as i32;
            if instructor.days > on_day.len() {
                badness *= 2;
            }
            problems.push(Problem {
                message: format!(
                    "instructor preference: {} has classes on {} day{} but wanted them on {} day{} (badness {})",
                    instructor.name,
                    on_day.len(),
                    plural(on_day.len()),
                    instructor.days,
                    plural(instructor.days),
                    badness
                ),
                badness,
            });
        }

        if instructor.courses.len() > 1 {
            let mut badness = 0i32;

            for classes in on_day.values() {
                // one lone class per day gets a pass
                let mut singleton_free = true;
                let mut i = 0;
                while i < classes.len() {
                    let mut next = i + 1;
                    while next < classes.len() {
                        let prev = &classes[next - 1];
                        let span =
                            model.courses[prev.course].slots_needed(&model.times[prev.time]);
                        let diff = classes[next].time - prev.time;
                        if diff > span {
                            let gap = diff - span;
                            if gap > 1 {
                                // 2 => 6, 3 => 12, 4 => 20
                                badness += (gap * (gap + 1)) as i32;
                            }
                            break;
                        }
                        next += 1;
                    }

                    let size = next - i;
                    i = next;

                    if size == 1 && singleton_free {
                        singleton_free = false;
                    } else if size != 2 {
                        // back-to-back pairs are the ideal cluster
                        let mismatch = size.abs_diff(2);
                        badness += ((mismatch + 2) * (mismatch + 2)) as i32;
                    }
                }
            }

            if badness > 0 {
                problems.push(Problem {
                    message: format!(
                        "instructor convenience: {} has classes that are poorly spread out (badness {})",
                        instructor.name, badness
                    ),
                    badness,
                });
            }
        }
    }

    // multi-section courses should be spread across days and halves,
    // but only when the missing side is actually open to them
    for name in by_course_name.keys().copied().sorted() {
        let list = &by_course_name[name];
        if list.len() < 2 {
            continue;
        }

        let (mut mw, mut tr, mut am, mut pm) = (0, 0, 0, 0);
        for p in list {
            let Some((side, half)) = countable(model, p.time) else {
                continue;
            };
            match side {
                DaySide::Mw => mw += 1,
                DaySide::Tr => tr += 1,
            }
            match half {
                HalfSide::Am => am += 1,
                HalfSide::Pm => pm += 1,
            }
        }
        if am + pm < 2 {
            continue;
        }

        let allowed = |want_day: Option<&DaySide>, want_half: Option<&HalfSide>| -> bool {
            for course in model.courses.iter().filter(|c| c.name == name) {
                for &ins in &course.instructors {
                    let instructor = &model.instructors[ins];
                    for t in 0..model.times.len() {
                        let Some((side, half)) = countable(model, t) else {
                            continue;
                        };
                        if let Some(want) = want_day {
                            if !matches!(
                                (want, &side),
                                (DaySide::Mw, DaySide::Mw) | (DaySide::Tr, DaySide::Tr)
                            ) {
                                continue;
                            }
                        }
                        if let Some(want) = want_half {
                            if !matches!(
                                (want, &half),
                                (HalfSide::Am, HalfSide::Am) | (HalfSide::Pm, HalfSide::Pm)
                            ) {
                                continue;
                            }
                        }
                        let ok = available(instructor.times[t])
                            && (course.times.is_empty() || available(course.times[t]));
                        if ok {
                            return true;
                        }
                    }
                }
            }
            false
        };

        if mw == 0 || tr == 0 {
            let (missing, label) = if tr == 0 {
                (DaySide::Tr, "TR")
            } else {
                (DaySide::Mw, "MW(F)")
            };
            if allowed(Some(&missing), None) {
                problems.push(Problem {
                    message: format!(
                        "section distribution: {} has multiple sections but none on {} (badness 15)",
                        name, label
                    ),
                    badness: 15,
                });
            }
        }

        if am == 0 || pm == 0 {
            let (missing, label) = if pm == 0 {
                (HalfSide::Pm, "afternoon")
            } else {
                (HalfSide::Am, "morning")
            };
            if allowed(None, Some(&missing)) {
                problems.push(Problem {
                    message: format!(
                        "section distribution: {} has multiple sections but none in the {} (badness 10)",
                        name, label
                    ),
                    badness: 10,
                });
            }
        }
    }

    problems.sort_by(|a, b| {
        b.badness
            .cmp(&a.badness)
            .then_with(|| a.message.cmp(&b.message))
    });

    let mut badness: i64 = 0;
    for problem in &problems {
        if problem.badness >= 0 && problem.badness < 100 {
            badness += problem.badness as i64;
        } else {
            badness += IMPOSSIBLE as i64;
        }
    }

    Schedule {
        placements: placements.to_vec(),
        grid,
        problems,
        badness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_str;

    fn place(course: usize, room: usize, time: usize) -> Placement {
        Placement { course, room, time }
    }

    #[test]
    fn clean_single_course_scores_zero() {
        let m = parse_str(
            "s1.txt",
            "\
room: R1 nocomputers
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: CS1 nocomputers
",
        )
        .unwrap();
        for t in 0..2 {
            let s = score(&m, &[place(0, 0, t)]);
            assert_eq!(s.badness, 0);
            assert!(s.problems.is_empty());
        }
    }

    #[test]
    fn studio_consumes_three_slots() {
        let m = parse_str(
            "s2.txt",
            "\
room: R1 art
time: MWF0800 mwf
time: MWF0900 mwf
time: MWF1000 mwf
instructor: Ann mwf
course: ART1 art studio
",
        )
        .unwrap();
        assert_eq!(m.courses[0].slots_needed(&m.times[0]), 3);
        let s = score(&m, &[place(0, 0, 0)]);
        assert_eq!(s.badness, 0);
        assert!(s.grid.cells[0][0].course.is_some());
        assert!(!s.grid.cells[0][0].spillover);
        assert!(s.grid.cells[0][1].spillover);
        assert!(s.grid.cells[0][2].spillover);
    }

    #[test]
    fn curriculum_conflict_message() {
        let m = parse_str(
            "s3.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: A R1 R2
instructor: Bob mw
course: B R1 R2
conflict: 30 A B
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 0, 0), place(1, 1, 0)]);
        assert_eq!(s.badness, 30);
        assert_eq!(s.problems.len(), 1);
        assert_eq!(
            s.problems[0].message,
            "curriculum conflict: A and B both meet at MW0900 (badness 30)"
        );
    }

    #[test]
    fn same_name_sections_overlap() {
        let m = parse_str(
            "s4.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: CS1 R1 R2
instructor: Bob mw
course: CS1 R1 R2
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 0, 0), place(1, 1, 0)]);
        assert_eq!(s.badness, 40);
        assert_eq!(s.problems.len(), 1);
        assert_eq!(
            s.problems[0].message,
            "curriculum conflict: CS1 has two sections meeting at MW0900 (badness 40)"
        );
    }

    #[test]
    fn anticonflict_wants_shared_start() {
        let m = parse_str(
            "s5.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: CS1 R1 R2
instructor: Bob mw
course: CS2 R1 R2
anticonflict: 25 CS1 CS2
",
        )
        .unwrap();
        let apart = score(&m, &[place(0, 0, 0), place(1, 1, 1)]);
        assert_eq!(apart.badness, 25);
        assert!(apart.problems[0]
            .message
            .starts_with("anticonflict: CS1 and CS2"));

        let together = score(&m, &[place(0, 0, 0), place(1, 1, 0)]);
        assert_eq!(together.badness, 0);
    }

    #[test]
    fn unavailable_instructor_is_impossible() {
        let m = parse_str(
            "s6.txt",
            "\
room: R1
time: MW0900 mw
time: MW1000 mw
instructor: Alice MW0900
course: CS1 R1
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 0, 1)]);
        assert!(s.badness >= IMPOSSIBLE as i64);
        assert_eq!(s.problems.len(), 1);
        assert!(s.problems[0]
            .message
            .starts_with("instructor not available: Alice has CS1 scheduled at MW1000"));
    }

    #[test]
    fn day_count_preference_doubles_when_under() {
        let m = parse_str(
            "days.txt",
            "\
room: R1
time: MW0900 mw
time: MW1000 mw
time:
time: TR0900 tr
time: TR1000 tr
instructor: Bob mw tr twodays
course: A R1
course: B R1
",
        )
        .unwrap();
        // both on one day: wanted 2, got 1, doubled
        let s = score(&m, &[place(0, 0, 0), place(1, 0, 1)]);
        assert_eq!(s.badness, 20);
        // spread over both days: no penalty
        let s = score(&m, &[place(0, 0, 0), place(1, 0, 3)]);
        assert_eq!(s.badness, 0);
    }

    #[test]
    fn too_many_days_is_not_doubled() {
        let m = parse_str(
            "days2.txt",
            "\
room: R1
time: MW0900 mw
time: MW1000 mw
time:
time: TR0900 tr
time: TR1000 tr
instructor: Bob mw tr oneday
course: A R1
course: B R1
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 0, 0), place(1, 0, 3)]);
        assert_eq!(s.badness, 10);
    }

    #[test]
    fn cluster_of_three_is_penalized() {
        let m = parse_str(
            "cluster.txt",
            "\
room: R1
time: MWF0800 mwf
time: MWF0900 mwf
time: MWF1000 mwf
instructor: Alice mwf
course: A R1
course: B R1
course: C R1
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 0, 0), place(1, 0, 1), place(2, 0, 2)]);
        assert_eq!(s.badness, 9);
        assert!(s.problems[0].message.contains("poorly spread out"));
    }

    #[test]
    fn gap_between_classes_is_penalized() {
        let m = parse_str(
            "gap.txt",
            "\
room: R1
time: MWF0800 mwf
time: MWF0900 mwf
time: MWF1000 mwf
time: MWF1100 mwf
instructor: Alice mwf
course: A R1
course: B R1
",
        )
        .unwrap();
        // gap of two free slots: 6, plus 9 for the second lone class
        let s = score(&m, &[place(0, 0, 0), place(1, 0, 3)]);
        assert_eq!(s.badness, 15);
    }

    #[test]
    fn room_spread_above_minimum() {
        let m = parse_str(
            "rooms.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: A R1 R2
course: B R1 R2
",
        )
        .unwrap();
        assert_eq!(m.instructors[0].min_rooms, 1);
        let s = score(&m, &[place(0, 0, 0), place(1, 1, 1)]);
        assert_eq!(s.badness, 1);
    }

    #[test]
    fn section_distribution_checks_allowed_sides() {
        let m = parse_str(
            "dist.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1030 mw
time:
time: TR0900 tr
time: TR1300 tr
instructor: Alice mw tr
course: CS1 R1 R2
course: CS1 R1 R2
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 0, 0), place(1, 1, 1)]);
        let messages: Vec<&str> = s.problems.iter().map(|p| p.message.as_str()).collect();
        assert!(messages.contains(
            &"section distribution: CS1 has multiple sections but none on TR (badness 15)"
        ));
        assert!(messages.contains(
            &"section distribution: CS1 has multiple sections but none in the afternoon (badness 10)"
        ));
    }

    #[test]
    fn problems_sort_by_badness_then_message() {
        let m = parse_str(
            "sort.txt",
            "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: A R1 R2:10
instructor: Bob mw
course: B R1 R2
conflict: 30 A B
",
        )
        .unwrap();
        let s = score(&m, &[place(0, 1, 0), place(1, 0, 0)]);
        assert_eq!(s.problems.len(), 2);
        assert!(s.problems[0].message.starts_with("curriculum conflict"));
        assert!(s.problems[1].message.starts_with("course room preference"));
        assert_eq!(s.badness, 40);
    }
}
