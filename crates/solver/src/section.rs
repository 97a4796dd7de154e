use crate::SolveError;
use types::{available, Badness, CourseId, InputModel, InstructorId, RoomId, TimeId, UNAVAILABLE};

/// One course section plus its table of candidate placements: a dense
/// rooms-by-times matrix of badness values, UNAVAILABLE where the cell is
/// ruled out. Tickets track the weight of the remaining options; the
/// section dies when its count reaches zero.
#[derive(Clone, Debug)]
pub struct Section {
    pub course: CourseId,
    pub instructors: Vec<InstructorId>,
    matrix: Vec<Badness>,
    n_times: usize,
    pub tickets: i64,
    pub count: usize,
}

impl Section {
    pub fn badness_at(&self, room: RoomId, time: TimeId) -> Badness {
        self.matrix[room * self.n_times + time]
    }

    pub fn feasible(&self, room: RoomId, time: TimeId) -> bool {
        self.badness_at(room, time) >= 0
    }

    /// Worsen a cell and every earlier start slot whose run would cover
    /// it, stopping at a break in the chain of consecutive times.
    /// UNAVAILABLE blocks the cells outright.
    pub fn block(&mut self, model: &InputModel, room: RoomId, time: TimeId, badness: Badness) {
        let course = &model.courses[self.course];
        let need = course.slots_needed(&model.times[time]);
        let mut t = time;
        for i in 0..need {
            if i > 0 {
                let Some(prev) = t.checked_sub(1) else { break };
                if model.times[prev].next != Some(t) {
                    break;
                }
                t = prev;
            }
            self.worsen(room, t, badness);
        }
    }

    fn worsen(&mut self, room: RoomId, time: TimeId, badness: Badness) {
        let idx = room * self.n_times + time;
        let old = self.matrix[idx];
        if old < 0 {
            return;
        }
        let new = if badness < 0 {
            UNAVAILABLE
        } else {
            old.max(badness)
        };
        if new == old {
            return;
        }
        self.tickets -= (100 - old) as i64;
        if new < 0 {
            self.count -= 1;
        } else {
            self.tickets += (100 - new) as i64;
        }
        self.matrix[idx] = new;
    }
}

/// Build one section per course, most-constrained-first, failing fast on
/// any course with no feasible cell at all.
pub fn build_sections(model: &InputModel) -> Result<Vec<Section>, SolveError> {
    let n_rooms = model.rooms.len();
    let n_times = model.times.len();

    let mut sections = Vec::with_capacity(model.courses.len());
    for (course_id, course) in model.courses.iter().enumerate() {
        let course_times = course_time_badness(model, course_id);

        let mut matrix = vec![UNAVAILABLE; n_rooms * n_times];
        let mut tickets = 0i64;
        let mut count = 0usize;
        for r in 0..n_rooms {
            if !available(course.rooms[r]) {
                continue;
            }
            for t in 0..n_times {
                if course_times[t] < 0 {
                    continue;
                }
                let badness = course.rooms[r].max(course_times[t]);
                matrix[r * n_times + t] = badness;
                tickets += (100 - badness) as i64;
                count += 1;
            }
        }
        if count == 0 {
            return Err(SolveError::Infeasible {
                course: course.name.clone(),
            });
        }

        sections.push(Section {
            course: course_id,
            instructors: course.instructors.clone(),
            matrix,
            n_times,
            tickets,
            count,
        });
    }

    sections.sort_by_key(|s| s.count);
    Ok(sections)
}

// Intersect the course's own time preferences with every listed
// instructor's availability, looking ahead over the full slot run.
fn course_time_badness(model: &InputModel, course_id: CourseId) -> Vec<Badness> {
    let course = &model.courses[course_id];
    let n_times = model.times.len();
    let mut out = vec![UNAVAILABLE; n_times];

    't: for t in 0..n_times {
        if !course.times.is_empty() && !available(course.times[t]) {
            continue;
        }
        let need = course.slots_needed(&model.times[t]);
        if !model.contiguous(t, need) {
            continue;
        }

        let mut instr_bad = 0i32;
        for j in 0..need {
            let mut slot_bad = 0i32;
            for &ins in &course.instructors {
                let b = model.instructors[ins].times[t + j];
                if !available(b) {
                    continue 't;
                }
                slot_bad = slot_bad.max(b);
            }
            instr_bad += slot_bad;
        }
        let instr_bad = instr_bad.min(99);

        out[t] = if course.times.is_empty() {
            instr_bad
        } else {
            instr_bad.max(course.times[t])
        };
    }
    out
}
