use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use types::{
    AntiConflict, Badness, Conflict, Course, InputModel, Instructor, InstructorId, Room, RoomId,
    Time, TimeId, STUDIO, UNAVAILABLE,
};

#[derive(Debug, Error)]
#[error("{file} line {line}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

pub fn parse_file(path: &Path) -> Result<InputModel, ParseError> {
    let file = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|err| ParseError {
        file: file.clone(),
        line: 0,
        message: err.to_string(),
    })?;
    parse_str(&file, &text)
}

pub fn parse_str(file: &str, text: &str) -> Result<InputModel, ParseError> {
    let mut parser = Parser::new(file);
    for (n, line) in text.lines().enumerate() {
        parser.line(n + 1, line)?;
    }
    parser.finish()
}

struct CourseDraft {
    name: String,
    instructors: Vec<InstructorId>,
    rooms: HashMap<RoomId, Badness>,
    times: HashMap<TimeId, Badness>,
    slots: usize,
}

struct InstructorDraft {
    name: String,
    times: HashMap<TimeId, Badness>,
    courses: Vec<usize>,
    days: usize,
}

struct Parser<'a> {
    file: &'a str,
    rooms: Vec<Room>,
    times: Vec<Time>,
    instructors: Vec<InstructorDraft>,
    courses: Vec<CourseDraft>,
    conflicts: Vec<(Badness, Vec<usize>)>,
    anti_conflicts: Vec<AntiConflict>,
    room_names: HashMap<String, RoomId>,
    time_names: HashMap<String, TimeId>,
    room_tags: HashMap<String, Vec<RoomId>>,
    time_tags: HashMap<String, Vec<TimeId>>,
    instructor_names: HashMap<String, InstructorId>,
    ignored: HashSet<String>,
    // previous time slot, for next-linking; a bare "time:" line clears it
    chain: Option<TimeId>,
    current_instructor: Option<InstructorId>,
}

impl<'a> Parser<'a> {
    fn new(file: &'a str) -> Self {
        Parser {
            file,
            rooms: Vec::new(),
            times: Vec::new(),
            instructors: Vec::new(),
            courses: Vec::new(),
            conflicts: Vec::new(),
            anti_conflicts: Vec::new(),
            room_names: HashMap::new(),
            time_names: HashMap::new(),
            room_tags: HashMap::new(),
            time_tags: HashMap::new(),
            instructor_names: HashMap::new(),
            ignored: HashSet::new(),
            chain: None,
            current_instructor: None,
        }
    }

    fn err<T>(&self, line: usize, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError {
            file: self.file.to_string(),
            line,
            message: message.into(),
        })
    }

    fn line(&mut self, n: usize, raw: &str) -> Result<(), ParseError> {
        // whitespace tokens; "//" starts a comment, even mid-token
        let mut fields: Vec<&str> = Vec::new();
        for token in raw.split_whitespace() {
            if let Some(i) = token.find("//") {
                if i > 0 {
                    fields.push(&token[..i]);
                }
                break;
            }
            fields.push(token);
        }
        if fields.is_empty() {
            return Ok(());
        }

        match fields[0] {
            "room:" => self.room(n, &fields),
            "time:" => self.time(n, &fields),
            "instructor:" => self.instructor(n, &fields),
            "course:" => self.course(n, &fields),
            "conflict:" => self.conflict(n, &fields),
            "anticonflict:" => self.anticonflict(n, &fields),
            "ignore:" => self.ignore(n, &fields),
            other => self.err(n, format!("unknown directive {:?}", other)),
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.room_names.contains_key(name)
            || self.time_names.contains_key(name)
            || self.room_tags.contains_key(name)
            || self.time_tags.contains_key(name)
    }

    fn room(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() < 2 {
            return self.err(n, "expected \"room: name tag tag ...\"");
        }
        let name = fields[1];
        if self.name_taken(name) {
            return self.err(n, format!("room name {:?} is already in use", name));
        }
        let id = self.rooms.len();
        let mut tags = Vec::new();
        for &tag in &fields[2..] {
            if self.room_names.contains_key(tag)
                || self.time_names.contains_key(tag)
                || self.time_tags.contains_key(tag)
            {
                return self.err(n, format!("room tag {:?} collides with another name", tag));
            }
            tags.push(tag.to_string());
            self.room_tags.entry(tag.to_string()).or_default().push(id);
        }
        self.room_names.insert(name.to_string(), id);
        self.rooms.push(Room {
            name: name.to_string(),
            tags,
        });
        Ok(())
    }

    fn time(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() == 1 {
            // a bare time: line breaks the chain of consecutive slots
            self.chain = None;
            return Ok(());
        }
        let name = fields[1];
        if self.name_taken(name) {
            return self.err(n, format!("time name {:?} is already in use", name));
        }
        let id = self.times.len();
        let mut tags = Vec::new();
        for &tag in &fields[2..] {
            if self.room_names.contains_key(tag)
                || self.time_names.contains_key(tag)
                || self.room_tags.contains_key(tag)
            {
                return self.err(n, format!("time tag {:?} collides with another name", tag));
            }
            tags.push(tag.to_string());
            self.time_tags.entry(tag.to_string()).or_default().push(id);
        }
        self.time_names.insert(name.to_string(), id);
        self.times.push(Time {
            name: name.to_string(),
            tags,
            next: None,
        });
        if let Some(prev) = self.chain {
            self.times[prev].next = Some(id);
        }
        self.chain = Some(id);
        Ok(())
    }

    fn instructor(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() < 3 {
            return self.err(n, "expected \"instructor: name time time ...\"");
        }
        let name = fields[1];
        if self.instructor_names.contains_key(name) {
            return self.err(n, format!("found duplicate instructor {:?}", name));
        }
        let mut draft = InstructorDraft {
            name: name.to_string(),
            times: HashMap::new(),
            courses: Vec::new(),
            days: 0,
        };
        for &token in &fields[2..] {
            match token {
                "oneday" => {
                    draft.days = 1;
                    continue;
                }
                "twodays" => {
                    draft.days = 2;
                    continue;
                }
                _ => {}
            }
            let (tag, badness) = match parse_pref(token) {
                Ok(pair) => pair,
                Err(message) => return self.err(n, message),
            };

            let mut hits = 0;
            if let Some(&t) = self.time_names.get(tag) {
                merge_pref(&mut draft.times, t, badness);
                hits += 1;
            }
            if let Some(times) = self.time_tags.get(tag) {
                for &t in times {
                    merge_pref(&mut draft.times, t, badness);
                }
                hits += 1;
            }
            match hits {
                0 => return self.err(n, format!("unresolved tag {:?} for instructor {:?}", tag, name)),
                1 => {}
                _ => {
                    return self.err(
                        n,
                        format!("tag {:?} for instructor {:?} has multiple resolutions", tag, name),
                    )
                }
            }
        }
        if draft.times.is_empty() {
            return self.err(n, format!("no valid times found for instructor {:?}", name));
        }

        let id = self.instructors.len();
        self.instructor_names.insert(name.to_string(), id);
        self.instructors.push(draft);
        self.current_instructor = Some(id);
        Ok(())
    }

    fn course(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() < 2 {
            return self.err(n, "expected \"course: name tag tag ...\"");
        }
        let Some(primary) = self.current_instructor else {
            return self.err(n, "course: must come after an instructor: line");
        };
        let name = fields[1];
        if self.ignored.contains(name) {
            return self.err(n, format!("ignored course {:?} used as a teaching assignment", name));
        }
        let id = self.courses.len();
        let mut draft = CourseDraft {
            name: name.to_string(),
            instructors: vec![primary],
            rooms: HashMap::new(),
            times: HashMap::new(),
            slots: 1,
        };
        for &token in &fields[2..] {
            match token {
                "studio" => {
                    draft.slots = STUDIO;
                    continue;
                }
                "twoslots" => {
                    draft.slots = 2;
                    continue;
                }
                "threeslots" => {
                    draft.slots = 3;
                    continue;
                }
                _ => {}
            }
            if let Some(other) = token.strip_prefix("coteach:") {
                let Some(&co) = self.instructor_names.get(other) else {
                    return self.err(n, format!("coteach refers to unknown instructor {:?}", other));
                };
                if draft.instructors.contains(&co) {
                    return self.err(n, format!("instructor {:?} listed twice for course {:?}", other, name));
                }
                draft.instructors.push(co);
                self.instructors[co].courses.push(id);
                continue;
            }

            let (tag, badness) = match parse_pref(token) {
                Ok(pair) => pair,
                Err(message) => return self.err(n, message),
            };

            let mut hits = 0;
            if let Some(&r) = self.room_names.get(tag) {
                merge_pref(&mut draft.rooms, r, badness);
                hits += 1;
            }
            if let Some(&t) = self.time_names.get(tag) {
                merge_pref(&mut draft.times, t, badness);
                hits += 1;
            }
            if let Some(rooms) = self.room_tags.get(tag) {
                for &r in rooms {
                    merge_pref(&mut draft.rooms, r, badness);
                }
                hits += 1;
            }
            if let Some(times) = self.time_tags.get(tag) {
                for &t in times {
                    merge_pref(&mut draft.times, t, badness);
                }
                hits += 1;
            }
            match hits {
                0 => return self.err(n, format!("unresolved tag {:?} in course {:?}", tag, name)),
                1 => {}
                _ => {
                    return self.err(
                        n,
                        format!("tag {:?} in course {:?} has multiple resolutions", tag, name),
                    )
                }
            }
        }
        if draft.rooms.is_empty() {
            return self.err(n, format!("no rooms found for course {:?}", name));
        }

        self.instructors[primary].courses.push(id);
        self.courses.push(draft);
        Ok(())
    }

    fn conflict_badness(&self, n: usize, token: &str) -> Result<Badness, ParseError> {
        let parsed: i32 = match token.parse() {
            Ok(v) => v,
            Err(_) => return self.err(n, format!("error parsing badness value {:?}", token)),
        };
        if !(-1..=100).contains(&parsed) {
            return self.err(n, format!("badness must be between -1 and 100 in {:?}", token));
        }
        // 100 and -1 both mean the pairing is forbidden outright
        Ok(if parsed < 0 || parsed >= 100 { UNAVAILABLE } else { parsed })
    }

    fn conflict(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() < 4 {
            return self.err(n, "expected \"conflict: badness course1 course2 ...\"");
        }
        let badness = self.conflict_badness(n, fields[1])?;

        let mut members: Vec<usize> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for &token in &fields[2..] {
            if self.ignored.contains(token) {
                continue;
            }
            if !seen.insert(token) {
                return self.err(n, format!("course {:?} repeated in conflict: line", token));
            }
            let matches: Vec<usize> = self
                .courses
                .iter()
                .positions(|c| c.name == token)
                .collect();
            if matches.is_empty() {
                return self.err(n, format!("course {:?} not found in conflict: line", token));
            }
            members.extend(matches);
        }
        if members.len() >= 2 {
            self.conflicts.push((badness, members));
        }
        Ok(())
    }

    fn anticonflict(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() < 4 {
            return self.err(n, "expected \"anticonflict: badness course1 course2 ...\"");
        }
        let badness = self.conflict_badness(n, fields[1])?;

        let mut names: Vec<String> = Vec::new();
        for &token in &fields[2..] {
            if self.ignored.contains(token) {
                continue;
            }
            if names.iter().any(|existing| existing == token) {
                return self.err(n, format!("course {:?} repeated in anticonflict: line", token));
            }
            if !self.courses.iter().any(|c| c.name == token) {
                return self.err(n, format!("course {:?} not found in anticonflict: line", token));
            }
            names.push(token.to_string());
        }
        if names.len() >= 2 {
            self.anti_conflicts.push(AntiConflict { badness, names });
        }
        Ok(())
    }

    fn ignore(&mut self, n: usize, fields: &[&str]) -> Result<(), ParseError> {
        if fields.len() < 2 {
            return self.err(n, "expected \"ignore: name name ...\"");
        }
        for &token in &fields[1..] {
            self.ignored.insert(token.to_string());
        }
        Ok(())
    }

    fn finish(self) -> Result<InputModel, ParseError> {
        let n_rooms = self.rooms.len();
        let n_times = self.times.len();

        let mut courses: Vec<Course> = self
            .courses
            .iter()
            .map(|draft| {
                let mut rooms = vec![UNAVAILABLE; n_rooms];
                for (&r, &b) in &draft.rooms {
                    rooms[r] = b;
                }
                let times = if draft.times.is_empty() {
                    Vec::new()
                } else {
                    let mut times = vec![UNAVAILABLE; n_times];
                    for (&t, &b) in &draft.times {
                        times[t] = b;
                    }
                    times
                };
                Course {
                    name: draft.name.clone(),
                    instructors: draft.instructors.clone(),
                    rooms,
                    times,
                    slots: draft.slots,
                    conflicts: HashMap::new(),
                }
            })
            .collect();

        let mut conflicts = Vec::new();
        for (badness, members) in &self.conflicts {
            for (&a, &b) in members.iter().tuple_combinations() {
                merge_conflict(&mut courses, a, b, *badness);
                merge_conflict(&mut courses, b, a, *badness);
            }
            conflicts.push(Conflict {
                badness: *badness,
                courses: members.clone(),
            });
        }

        let instructors = self
            .instructors
            .iter()
            .map(|draft| {
                let mut times = vec![UNAVAILABLE; n_times];
                for (&t, &b) in &draft.times {
                    times[t] = b;
                }
                Instructor {
                    name: draft.name.clone(),
                    times,
                    courses: draft.courses.clone(),
                    days: draft.days,
                    min_rooms: min_rooms(&courses, &draft.courses),
                }
            })
            .collect();

        Ok(InputModel {
            rooms: self.rooms,
            times: self.times,
            instructors,
            courses,
            conflicts,
            anti_conflicts: self.anti_conflicts,
        })
    }
}

fn merge_pref<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Badness>, key: K, badness: Badness) {
    let entry = map.entry(key).or_insert(badness);
    if badness > *entry {
        *entry = badness;
    }
}

fn merge_conflict(courses: &mut [Course], a: usize, b: usize, badness: Badness) {
    let entry = courses[a].conflicts.entry(b).or_insert(badness);
    if badness > *entry {
        *entry = badness;
    }
}

fn parse_pref(token: &str) -> Result<(&str, Badness), String> {
    let mut parts = token.split(':');
    let tag = parts.next().unwrap_or("");
    match parts.next() {
        None => Ok((tag, 0)),
        Some(raw) => {
            if parts.next().is_some() {
                return Err(format!("error parsing badness value in {:?}", token));
            }
            let badness: i32 = raw
                .parse()
                .map_err(|_| format!("error parsing badness value in {:?}", token))?;
            if !(0..=100).contains(&badness) {
                return Err(format!("badness must be between 0 and 100 in {:?}", token));
            }
            Ok((tag, badness))
        }
    }
}

/// The smallest number of rooms that can host every course in the list:
/// the minimum hitting set over the per-course room sets. The instance
/// sizes here are tiny, so we brute-force subsets in ascending size.
fn min_rooms(courses: &[Course], owned: &[usize]) -> usize {
    if owned.len() <= 1 {
        return 1;
    }
    let mut rooms: Vec<RoomId> = owned
        .iter()
        .flat_map(|&c| {
            courses[c]
                .rooms
                .iter()
                .enumerate()
                .filter(|(_, &b)| b >= 0)
                .map(|(r, _)| r)
        })
        .collect();
    rooms.sort_unstable();
    rooms.dedup();

    for k in 1..owned.len() {
        for set in rooms.iter().combinations(k) {
            let covers_all = owned
                .iter()
                .all(|&c| set.iter().any(|&&r| courses[c].rooms[r] >= 0));
            if covers_all {
                return k;
            }
        }
    }
    owned.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = "\
// a small but complete input
room: R1 nocomputers
room: R2 computers

time: MWF0800 mwf
time: MWF0900 mwf
time: MWF1000 mwf
time:
time: TR0900 tr
time: TR1030 tr

instructor: alice mwf twodays
course: CS1 computers
course: CS2 computers twoslots

instructor: bob mwf:20 tr oneday
course: ART1 nocomputers studio

conflict: 30 CS1 ART1
anticonflict: 25 CS1 CS2
";

    fn model() -> InputModel {
        parse_str("basic.txt", BASIC).expect("parse failed")
    }

    #[test]
    fn parses_rooms_times_and_links() {
        let m = model();
        assert_eq!(m.rooms.len(), 2);
        assert_eq!(m.times.len(), 5);
        assert_eq!(m.times[0].next, Some(1));
        assert_eq!(m.times[1].next, Some(2));
        // the bare time: line breaks the chain before TR0900
        assert_eq!(m.times[2].next, None);
        assert_eq!(m.times[3].next, Some(4));
        assert_eq!(m.times[4].next, None);
    }

    #[test]
    fn resolves_instructor_times() {
        let m = model();
        let alice = &m.instructors[0];
        assert_eq!(alice.name, "alice");
        assert_eq!(alice.days, 2);
        assert_eq!(alice.times, vec![0, 0, 0, -1, -1]);
        let bob = &m.instructors[1];
        assert_eq!(bob.days, 1);
        assert_eq!(bob.times, vec![20, 20, 20, 0, 0]);
    }

    #[test]
    fn resolves_course_rooms_and_slots() {
        let m = model();
        let cs1 = &m.courses[0];
        assert_eq!(cs1.rooms, vec![-1, 0]);
        assert!(cs1.times.is_empty());
        assert_eq!(cs1.slots, 1);
        assert_eq!(m.courses[1].slots, 2);
        assert_eq!(m.courses[2].slots, STUDIO);
    }

    #[test]
    fn conflicts_are_symmetric() {
        let m = model();
        assert_eq!(m.courses[0].conflicts.get(&2), Some(&30));
        assert_eq!(m.courses[2].conflicts.get(&0), Some(&30));
        assert_eq!(m.anti_conflicts.len(), 1);
        assert_eq!(m.anti_conflicts[0].names, vec!["CS1", "CS2"]);
    }

    #[test]
    fn min_rooms_covers_owned_courses() {
        let m = model();
        // alice teaches two courses that fit in one room
        assert_eq!(m.instructors[0].min_rooms, 1);
        assert_eq!(m.instructors[1].min_rooms, 1);
    }

    #[test]
    fn coteach_adds_both_instructors() {
        let text = "\
room: R1
time: MWF0900 mwf
time: MWF1000 mwf
instructor: alice mwf
instructor: bob mwf
course: CS5 R1 coteach:alice
";
        let m = parse_str("x.txt", text).unwrap();
        let course = &m.courses[0];
        assert_eq!(course.instructors, vec![1, 0]);
        assert_eq!(m.instructors[0].courses, vec![0]);
        assert_eq!(m.instructors[1].courses, vec![0]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = "\
// leading comment
room: R1 // trailing comment
time: MWF0900 mwf

instructor: alice mwf
course: CS1 R1
";
        let m = parse_str("x.txt", text).unwrap();
        assert_eq!(m.rooms.len(), 1);
        assert_eq!(m.rooms[0].tags.len(), 0);
    }

    #[test]
    fn ignore_skips_conflict_members() {
        let text = "\
room: R1
time: MWF0900 mwf
instructor: alice mwf
course: CS1 R1
course: CS2 R1
ignore: XFER
conflict: 50 CS1 CS2 XFER
anticonflict: 20 CS1 XFER CS2
";
        let m = parse_str("x.txt", text).unwrap();
        assert_eq!(m.courses[0].conflicts.get(&1), Some(&50));
        assert_eq!(m.anti_conflicts[0].names, vec!["CS1", "CS2"]);
    }

    #[test]
    fn rejects_bad_input() {
        let cases: &[(&str, &str)] = &[
            ("room: R1\nroom: R1\n", "already in use"),
            ("room: R1\ntime: R1\n", "already in use"),
            ("course: CS1 R1\n", "must come after"),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice nosuch\n",
                "unresolved tag",
            ),
            (
                "room: R1 mw\ntime: MWF0900 mw\n",
                "collides",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf:101\n",
                "between 0 and 100",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf\ncourse: CS1 R1 coteach:carol\n",
                "unknown instructor",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf\ncourse: CS1 R1\nconflict: 200 CS1 CS1\n",
                "between -1 and 100",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf\ncourse: CS1 R1\nconflict: 10 CS1 CS9\n",
                "not found",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf\nignore: CS1\ncourse: CS1 R1\n",
                "ignored course",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf\ninstructor: alice mwf\n",
                "duplicate instructor",
            ),
            (
                "room: R1\ntime: MWF0900 mwf\ninstructor: alice mwf\ncourse: CS1\n",
                "no rooms found",
            ),
        ];
        for (text, needle) in cases {
            let err = parse_str("bad.txt", text).expect_err(text);
            assert!(
                err.message.contains(needle),
                "expected {:?} in {:?}",
                needle,
                err.message
            );
        }
    }

    #[test]
    fn conflict_badness_is_normalized() {
        let text = "\
room: R1
time: MWF0900 mwf
instructor: alice mwf
course: CS1 R1
course: CS2 R1
conflict: 100 CS1 CS2
";
        let m = parse_str("x.txt", text).unwrap();
        assert_eq!(m.courses[0].conflicts.get(&1), Some(&UNAVAILABLE));
    }
}
