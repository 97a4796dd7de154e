use std::collections::HashMap;
use timetable_core::Schedule;
use types::{InputModel, Placement};

/// Draw the room-by-time grid with instructor and course names in each
/// occupied cell, followed by the total badness and the problem list.
pub fn print_schedule(model: &InputModel, schedule: &Schedule) {
    let mut name_len = 0;
    for instructor in &model.instructors {
        name_len = name_len.max(instructor.name.len());
    }
    for course in &model.courses {
        name_len = name_len.max(course.name.len());
    }
    let room_len = model.rooms.iter().map(|r| r.name.len()).max().unwrap_or(0);
    name_len = name_len.max(room_len);
    let time_len = model.times.iter().map(|t| t.name.len()).max().unwrap_or(0);

    let hyphens = "-".repeat(name_len);

    print!("{:>time_len$} ", "");
    for room in &model.rooms {
        let pad = (name_len - room.name.len()) / 2;
        print!("  {:>pad$}{:<rest$} ", "", room.name, rest = name_len - pad);
    }
    println!();

    for (t, time) in model.times.iter().enumerate() {
        print!("{:>time_len$} ", "");
        for r in 0..model.rooms.len() {
            if schedule.grid.cells[r][t].spillover {
                print!("+ {:<name_len$} ", "");
            } else {
                print!("+-{hyphens}-");
            }
        }
        println!("+");

        print!("{:>time_len$} ", time.name);
        for r in 0..model.rooms.len() {
            let cell = schedule.grid.cells[r][t];
            match cell.course {
                Some(c) if !cell.spillover => {
                    let primary = model.courses[c].primary();
                    print!("| {:<name_len$} ", model.instructors[primary].name);
                }
                _ => print!("| {:<name_len$} ", ""),
            }
        }
        println!("|");

        print!("{:>time_len$} ", "");
        for r in 0..model.rooms.len() {
            let cell = schedule.grid.cells[r][t];
            match cell.course {
                Some(c) if !cell.spillover => {
                    print!("| {:<name_len$} ", model.courses[c].name);
                }
                _ => print!("| {:<name_len$} ", ""),
            }
        }
        println!("|");
    }

    print!("{:>time_len$} ", "");
    for _ in &model.rooms {
        print!("+-{hyphens}-");
    }
    println!("+");
    println!();

    println!(
        "Total badness {} with the following known problems:",
        schedule.badness
    );
    for problem in &schedule.problems {
        println!("* {}", problem.message);
    }
}

fn column_widths(model: &InputModel, placements: &[Placement]) -> (usize, usize, usize, usize) {
    let mut course_len = 0;
    let mut instructor_len = 0;
    let mut room_len = 0;
    let mut time_len = 0;
    for p in placements {
        let course = &model.courses[p.course];
        course_len = course_len.max(course.name.len());
        instructor_len = instructor_len.max(model.instructors[course.primary()].name.len());
        room_len = room_len.max(model.rooms[p.room].name.len());
        time_len = time_len.max(model.times[p.time].name.len());
    }
    (course_len, instructor_len, room_len, time_len)
}

pub fn print_by_course(model: &InputModel, placements: &[Placement]) {
    let (course_len, instructor_len, room_len, time_len) = column_widths(model, placements);

    let mut by_name: HashMap<&str, Vec<&Placement>> = HashMap::new();
    for p in placements {
        by_name
            .entry(model.courses[p.course].name.as_str())
            .or_default()
            .push(p);
    }
    let mut names: Vec<&str> = by_name.keys().copied().collect();
    names.sort_unstable();

    println!("Schedule by course:");
    for name in names {
        let list = by_name.get_mut(name).unwrap();
        list.sort_by(|a, b| {
            let ia = &model.instructors[model.courses[a.course].primary()].name;
            let ib = &model.instructors[model.courses[b.course].primary()].name;
            ia.cmp(ib)
                .then_with(|| model.times[a.time].name.cmp(&model.times[b.time].name))
        });
        for p in list.iter() {
            let course = &model.courses[p.course];
            println!(
                "{:>course_len$}  {:>time_len$}  {:<instructor_len$}  {:>room_len$}",
                course.name,
                model.times[p.time].name,
                model.instructors[course.primary()].name,
                model.rooms[p.room].name,
            );
        }
    }
}

pub fn print_by_instructor(model: &InputModel, placements: &[Placement]) {
    let (course_len, instructor_len, room_len, time_len) = column_widths(model, placements);

    let mut by_course: HashMap<usize, &Placement> = HashMap::new();
    for p in placements {
        by_course.insert(p.course, p);
    }

    println!("Schedule by instructor:");
    for instructor in &model.instructors {
        for &course_id in &instructor.courses {
            let Some(p) = by_course.get(&course_id) else {
                continue;
            };
            println!(
                "{:<instructor_len$}  {:>course_len$}  {:>room_len$}  {:>time_len$}",
                instructor.name,
                model.courses[course_id].name,
                model.rooms[p.room].name,
                model.times[p.time].name,
            );
        }
    }
}
