use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type RoomId = usize;
pub type TimeId = usize;
pub type InstructorId = usize;
pub type CourseId = usize;

/// A preference level: 0 is ideal, 1..99 is a soft penalty, anything
/// negative or >= 100 means the option is unavailable.
pub type Badness = i32;

pub const UNAVAILABLE: Badness = -1;

pub fn available(b: Badness) -> bool {
    (0..100).contains(&b)
}

/// Merge two preference levels, keeping the worse of the two; an
/// unavailable operand makes the result unavailable.
pub fn worst(a: Badness, b: Badness) -> Badness {
    if !available(a) || !available(b) {
        UNAVAILABLE
    } else {
        a.max(b)
    }
}

// studio courses take 3 slots on MWF and 2 on TR
pub const STUDIO: usize = 23;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Time {
    pub name: String,
    pub tags: Vec<String>,
    pub next: Option<TimeId>,
}

impl Time {
    /// The leading non-digit characters of the name: "MWF0900" -> "MWF".
    pub fn prefix(&self) -> &str {
        let brk = self
            .name
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.name.len());
        &self.name[..brk]
    }

    /// Day-grouping key: the prefix lowercased and cut to two characters,
    /// so MWF0900 and MW1030 both land on "mw".
    pub fn day(&self) -> String {
        let p = self.prefix();
        let cut = p.len().min(2);
        p[..cut].to_ascii_lowercase()
    }

    /// The HHMM portion of the name, when it looks like one.
    pub fn hour(&self) -> Option<&str> {
        let brk = self.name.find(|c: char| c.is_ascii_digit())?;
        let rest = &self.name[brk..];
        if rest.len() == 4 && rest.bytes().all(|b| b.is_ascii_digit()) {
            Some(rest)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instructor {
    pub name: String,
    /// Availability per time index; UNAVAILABLE where not listed.
    pub times: Vec<Badness>,
    pub courses: Vec<CourseId>,
    /// Preferred number of teaching days: 0 means no preference.
    pub days: usize,
    pub min_rooms: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    /// The first entry is the primary instructor.
    pub instructors: Vec<InstructorId>,
    /// Room preference per room index; UNAVAILABLE where not listed.
    pub rooms: Vec<Badness>,
    /// Time preference per time index; empty means the instructor's
    /// availability is the only time constraint.
    pub times: Vec<Badness>,
    pub slots: usize,
    pub conflicts: HashMap<CourseId, Badness>,
}

impl Course {
    pub fn primary(&self) -> InstructorId {
        self.instructors[0]
    }

    /// How many consecutive slots this course needs if it starts at t.
    pub fn slots_needed(&self, t: &Time) -> usize {
        if self.slots != STUDIO {
            return self.slots;
        }
        match t.prefix() {
            "MWF" => 3,
            "TR" => 2,
            _ => STUDIO,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conflict {
    pub badness: Badness,
    pub courses: Vec<CourseId>,
}

/// Courses (matched by name, so every section counts) that should have at
/// least one pair of sections starting at the same slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AntiConflict {
    pub badness: Badness,
    pub names: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub course: CourseId,
    pub room: RoomId,
    pub time: TimeId,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputModel {
    pub rooms: Vec<Room>,
    pub times: Vec<Time>,
    pub instructors: Vec<Instructor>,
    pub courses: Vec<Course>,
    pub conflicts: Vec<Conflict>,
    pub anti_conflicts: Vec<AntiConflict>,
}

impl InputModel {
    pub fn room_index(&self, name: &str) -> Option<RoomId> {
        self.rooms.iter().position(|r| r.name == name)
    }

    pub fn time_index(&self, name: &str) -> Option<TimeId> {
        self.times.iter().position(|t| t.name == name)
    }

    /// How many time slots share each day key; a day only exists when at
    /// least two slots share its key.
    pub fn times_per_day(&self) -> HashMap<String, usize> {
        let mut per_day = HashMap::new();
        for time in &self.times {
            let day = time.day();
            if !day.is_empty() {
                *per_day.entry(day).or_insert(0) += 1;
            }
        }
        per_day
    }

    /// Whether the run of slots time..time+need is chained by next links.
    pub fn contiguous(&self, time: TimeId, need: usize) -> bool {
        if time + need > self.times.len() {
            return false;
        }
        for t in time..time + need.saturating_sub(1) {
            if self.times[t].next != Some(t + 1) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(name: &str) -> Time {
        Time {
            name: name.into(),
            tags: vec![],
            next: None,
        }
    }

    #[test]
    fn prefix_and_day() {
        let t = time("MWF0900");
        assert_eq!(t.prefix(), "MWF");
        assert_eq!(t.day(), "mw");
        let t = time("TR1030");
        assert_eq!(t.prefix(), "TR");
        assert_eq!(t.day(), "tr");
        let t = time("online");
        assert_eq!(t.prefix(), "online");
        assert_eq!(t.day(), "on");
        assert_eq!(t.hour(), None);
    }

    #[test]
    fn hour_needs_four_digits() {
        assert_eq!(time("MWF0900").hour(), Some("0900"));
        assert_eq!(time("MW930").hour(), None);
        assert_eq!(time("evening").hour(), None);
    }

    #[test]
    fn worst_prefers_unavailable() {
        assert_eq!(worst(0, 30), 30);
        assert_eq!(worst(45, 30), 45);
        assert_eq!(worst(-1, 30), UNAVAILABLE);
        assert_eq!(worst(100, 0), UNAVAILABLE);
    }

    #[test]
    fn studio_slot_counts() {
        let c = Course {
            name: "ART1".into(),
            instructors: vec![0],
            rooms: vec![],
            times: vec![],
            slots: STUDIO,
            conflicts: HashMap::new(),
        };
        assert_eq!(c.slots_needed(&time("MWF0800")), 3);
        assert_eq!(c.slots_needed(&time("TR0900")), 2);
        assert_eq!(c.slots_needed(&time("MW1030")), STUDIO);
    }
}
