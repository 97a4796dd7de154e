use crate::section::Section;
use rand::Rng;
use std::collections::HashMap;
use types::{CourseId, InputModel, Placement, RoomId, TimeId, UNAVAILABLE};

/// Run one randomized construction pass: walk the sections most
/// constrained first, keep the baseline placement with probability
/// `local_pin` (percent), otherwise run a lottery over the remaining
/// cells. Returns None when constraint propagation kills a section
/// before it is placed.
pub fn place_sections<R: Rng>(
    model: &InputModel,
    sections: &[Section],
    baseline: &[Placement],
    local_pin: f64,
    weighted: bool,
    rng: &mut R,
) -> Option<Vec<Placement>> {
    let mut sections: Vec<Section> = sections.to_vec();
    let n_rooms = model.rooms.len();

    let old: HashMap<CourseId, (RoomId, TimeId)> = baseline
        .iter()
        .map(|p| (p.course, (p.room, p.time)))
        .collect();

    let mut placements = Vec::with_capacity(sections.len());
    for k in 0..sections.len() {
        let (room, time) = {
            let section = &sections[k];
            let pinned = old
                .get(&section.course)
                .copied()
                .filter(|&(r, t)| section.feasible(r, t));
            match pinned {
                Some(rt) if local_pin > 0.0 && rng.gen_range(0.0..100.0) < local_pin => rt,
                _ => lottery(model, section, weighted, rng),
            }
        };

        let course_id = sections[k].course;
        placements.push(Placement {
            course: course_id,
            room,
            time,
        });

        let placed = &model.courses[course_id];
        let need = placed.slots_needed(&model.times[time]);

        for later in k + 1..sections.len() {
            let other = &model.courses[sections[later].course];
            let shares = other
                .instructors
                .iter()
                .any(|i| placed.instructors.contains(i));
            let conflict = placed.conflicts.get(&sections[later].course).copied();

            let section = &mut sections[later];
            let mut t = time;
            for i in 0..need {
                section.block(model, room, t, UNAVAILABLE);
                if shares {
                    for r in 0..n_rooms {
                        section.block(model, r, t, UNAVAILABLE);
                    }
                }
                if let Some(badness) = conflict {
                    for r in 0..n_rooms {
                        section.block(model, r, t, badness);
                    }
                }
                if i + 1 < need {
                    match model.times[t].next {
                        Some(next) => t = next,
                        None => break,
                    }
                }
            }

            if section.tickets <= 0 || section.count == 0 {
                return None;
            }

            // keep the remaining list most-constrained-first
            let mut j = later;
            while j > k + 1 && sections[j].count <= sections[j - 1].count {
                sections.swap(j, j - 1);
                j -= 1;
            }
        }
    }

    Some(placements)
}

fn lottery<R: Rng>(
    model: &InputModel,
    section: &Section,
    weighted: bool,
    rng: &mut R,
) -> (RoomId, TimeId) {
    let mut ticket = if weighted {
        rng.gen_range(0..section.tickets)
    } else {
        rng.gen_range(0..section.count as i64)
    };
    for room in 0..model.rooms.len() {
        for time in 0..model.times.len() {
            let badness = section.badness_at(room, time);
            if badness < 0 {
                continue;
            }
            ticket -= if weighted { (100 - badness) as i64 } else { 1 };
            if ticket < 0 {
                return (room, time);
            }
        }
    }
    panic!(
        "lottery failed to land on a cell for {} with {} tickets left",
        model.courses[section.course].name, section.tickets
    );
}
