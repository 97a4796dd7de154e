use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::{InputModel, Placement};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Malformed(String),
}

fn malformed(message: String) -> PersistError {
    PersistError::Malformed(message)
}

/// Parse a saved schedule: a JSON object keyed by instructor name, with
/// one [course, room, time] triple per course in declaration order.
pub fn read_schedule(model: &InputModel, text: &str) -> Result<Vec<Placement>, PersistError> {
    let sched: HashMap<String, Vec<Vec<String>>> = serde_json::from_str(text)?;

    let mut out = Vec::new();
    for (ins_id, instructor) in model.instructors.iter().enumerate() {
        let courses = sched.get(&instructor.name).ok_or_else(|| {
            malformed(format!(
                "no schedule entry for instructor {}",
                instructor.name
            ))
        })?;
        if courses.len() != instructor.courses.len() {
            return Err(malformed(format!(
                "found {} courses for {}, but expected to find {}",
                courses.len(),
                instructor.name,
                instructor.courses.len()
            )));
        }
        for (i, entry) in courses.iter().enumerate() {
            let course_id = instructor.courses[i];
            let course = &model.courses[course_id];

            // co-taught courses appear under every instructor, but only
            // the primary instructor's entry is authoritative
            if course.primary() != ins_id {
                continue;
            }
            if entry.len() != 3 {
                return Err(malformed(format!(
                    "malformed entry for course #{} of instructor {}",
                    i + 1,
                    instructor.name
                )));
            }
            if entry[0] != course.name {
                return Err(malformed(format!(
                    "instructor {} course #{} should be {} but found {} instead",
                    instructor.name,
                    i + 1,
                    course.name,
                    entry[0]
                )));
            }
            let room = model.room_index(&entry[1]).ok_or_else(|| {
                malformed(format!(
                    "instructor {} course {} has unrecognized room name {:?}",
                    instructor.name, course.name, entry[1]
                ))
            })?;
            let time = model.time_index(&entry[2]).ok_or_else(|| {
                malformed(format!(
                    "instructor {} course {} has unrecognized time name {:?}",
                    instructor.name, course.name, entry[2]
                ))
            })?;
            out.push(Placement {
                course: course_id,
                room,
                time,
            });
        }
    }
    if sched.len() != model.instructors.len() {
        return Err(malformed(format!(
            "expected schedules for {} instructors, but found {}",
            model.instructors.len(),
            sched.len()
        )));
    }

    Ok(out)
}

pub fn read_schedule_file(
    model: &InputModel,
    path: &Path,
) -> Result<Vec<Placement>, PersistError> {
    let text = fs::read_to_string(path)?;
    read_schedule(model, &text)
}

pub fn schedule_json(
    model: &InputModel,
    placements: &[Placement],
) -> Result<serde_json::Value, PersistError> {
    let mut by_course: HashMap<usize, &Placement> = HashMap::new();
    for placement in placements {
        by_course.insert(placement.course, placement);
    }

    let mut object = serde_json::Map::new();
    for instructor in &model.instructors {
        let mut entries = Vec::with_capacity(instructor.courses.len());
        for &course_id in &instructor.courses {
            let course = &model.courses[course_id];
            let placement = by_course.get(&course_id).ok_or_else(|| {
                malformed(format!("no placement for course {}", course.name))
            })?;
            entries.push(json!([
                course.name,
                model.rooms[placement.room].name,
                model.times[placement.time].name,
            ]));
        }
        object.insert(instructor.name.clone(), json!(entries));
    }
    Ok(serde_json::Value::Object(object))
}

/// Write the schedule to disk atomically: dump to a sibling temp file,
/// flush it, then rename over the destination.
pub fn write_schedule_file(
    model: &InputModel,
    path: &Path,
    placements: &[Placement],
) -> Result<(), PersistError> {
    let value = schedule_json(model, placements)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut fp = fs::File::create(&tmp)?;
    serde_json::to_writer_pretty(&mut fp, &value)?;
    fp.write_all(b"\n")?;
    fp.sync_all()?;
    drop(fp);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_str;

    const INPUT: &str = "\
room: R1
room: R2
time: MW0900 mw
time: MW1000 mw
instructor: Alice mw
course: CS1 R1 R2
instructor: Bob mw
course: CS2 R1 R2 coteach:Alice
";

    fn model() -> InputModel {
        parse_str("persist.txt", INPUT).unwrap()
    }

    fn placements() -> Vec<Placement> {
        vec![
            Placement {
                course: 0,
                room: 0,
                time: 0,
            },
            Placement {
                course: 1,
                room: 1,
                time: 1,
            },
        ]
    }

    #[test]
    fn round_trip_with_coteach() {
        let m = model();
        let value = schedule_json(&m, &placements()).unwrap();
        // both instructors carry the co-taught course, same triple
        assert_eq!(value["Alice"].as_array().unwrap().len(), 2);
        assert_eq!(value["Bob"].as_array().unwrap().len(), 1);
        assert_eq!(value["Alice"][1], value["Bob"][0]);

        let text = serde_json::to_string(&value).unwrap();
        let read = read_schedule(&m, &text).unwrap();
        assert_eq!(read, placements());
    }

    #[test]
    fn rejects_count_mismatch() {
        let m = model();
        let text = r#"{"Alice": [["CS1", "R1", "MW0900"]], "Bob": [["CS2", "R2", "MW1000"]]}"#;
        let err = read_schedule(&m, text).unwrap_err();
        assert!(err.to_string().contains("expected to find 2"));
    }

    #[test]
    fn rejects_unknown_room() {
        let m = model();
        let text = concat!(
            r#"{"Alice": [["CS1", "R9", "MW0900"], ["CS2", "R2", "MW1000"]],"#,
            r#" "Bob": [["CS2", "R2", "MW1000"]]}"#
        );
        let err = read_schedule(&m, text).unwrap_err();
        assert!(err.to_string().contains("unrecognized room name"));
    }

    #[test]
    fn rejects_course_out_of_order() {
        let m = model();
        let text = concat!(
            r#"{"Alice": [["CS2", "R1", "MW0900"], ["CS1", "R2", "MW1000"]],"#,
            r#" "Bob": [["CS2", "R2", "MW1000"]]}"#
        );
        let err = read_schedule(&m, text).unwrap_err();
        assert!(err.to_string().contains("should be CS1"));
    }

    #[test]
    fn rejects_missing_instructor() {
        let m = model();
        let text = r#"{"Alice": [["CS1", "R1", "MW0900"], ["CS2", "R2", "MW1000"]]}"#;
        let err = read_schedule(&m, text).unwrap_err();
        assert!(err.to_string().contains("no schedule entry"));
    }

    #[test]
    fn atomic_write_creates_file() {
        let m = model();
        let dir = std::env::temp_dir().join("timetable-persist-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("schedule.json");
        write_schedule_file(&m, &path, &placements()).unwrap();
        let read = read_schedule_file(&m, &path).unwrap();
        assert_eq!(read, placements());
        fs::remove_dir_all(&dir).unwrap();
    }
}
