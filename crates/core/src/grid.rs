use types::{CourseId, InputModel, Placement};

#[derive(Clone, Copy, Debug, Default)]
pub struct Cell {
    pub course: Option<CourseId>,
    pub spillover: bool,
}

/// A rooms-by-times view of a set of placements. Multi-slot courses mark
/// their starting cell plus spillover cells for the rest of their run.
#[derive(Clone, Debug)]
pub struct Grid {
    pub cells: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn build(model: &InputModel, placements: &[Placement]) -> Grid {
        let mut cells = vec![vec![Cell::default(); model.times.len()]; model.rooms.len()];
        for placement in placements {
            let course = &model.courses[placement.course];
            let need = course.slots_needed(&model.times[placement.time]);
            let mut t = placement.time;
            for i in 0..need {
                let cell = &mut cells[placement.room][t];
                if let Some(other) = cell.course {
                    panic!(
                        "double booking in {} at {}: {} and {}",
                        model.rooms[placement.room].name,
                        model.times[t].name,
                        model.courses[other].name,
                        course.name,
                    );
                }
                *cell = Cell {
                    course: Some(placement.course),
                    spillover: i > 0,
                };
                if i + 1 < need {
                    t = match model.times[t].next {
                        Some(next) => next,
                        None => panic!(
                            "{} runs past a break in the time grid after {}",
                            course.name, model.times[t].name,
                        ),
                    };
                }
            }
        }
        Grid { cells }
    }

    pub fn cell(&self, room: usize, time: usize) -> Cell {
        self.cells[room][time]
    }
}
