use super::Cell;
use crate::color::Color;
use crate::settings::CameraSettings;

/// Index of a live [`Shape`] in a [`ShapeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeHandle(u32);

impl ShapeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A connected blob of valid pixels. `color` is the sum of the member
/// pixels' last read colors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Shape {
    pub pixels: u32,
    pub color: Color,
}

impl Shape {
    pub fn average(&self) -> Color {
        if self.pixels == 0 {
            return Color::BLACK;
        }
        (self.color / self.pixels as f32).finite()
    }
}

/// Shape storage with slot reuse. A slot is live while `pixels > 0`.
#[derive(Clone, Debug, Default)]
pub struct ShapeArena {
    slots: Vec<Shape>,
    free: Vec<u32>,
}

impl ShapeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, seed: Color) -> ShapeHandle {
        let shape = Shape {
            pixels: 1,
            color: seed,
        };
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = shape;
            return ShapeHandle(idx);
        }
        self.slots.push(shape);
        ShapeHandle((self.slots.len() - 1) as u32)
    }

    pub fn get(&self, handle: ShapeHandle) -> Option<&Shape> {
        self.slots.get(handle.index()).filter(|s| s.pixels > 0)
    }

    pub fn average(&self, handle: ShapeHandle) -> Color {
        self.get(handle).map(Shape::average).unwrap_or(Color::BLACK)
    }

    pub fn join(&mut self, handle: ShapeHandle, color: Color) {
        let shape = &mut self.slots[handle.index()];
        shape.pixels += 1;
        shape.color += color;
    }

    pub fn replace(&mut self, handle: ShapeHandle, old: Color, new: Color) {
        let shape = &mut self.slots[handle.index()];
        shape.color -= old;
        shape.color += new;
    }

    /// Removes one member; returns true when the shape died and its slot was
    /// reclaimed.
    pub fn leave(&mut self, handle: ShapeHandle, color: Color) -> bool {
        let shape = &mut self.slots[handle.index()];
        shape.pixels = shape.pixels.saturating_sub(1);
        shape.color -= color;
        if shape.pixels > 0 {
            return false;
        }
        *shape = Shape::default();
        self.free.push(handle.0);
        true
    }

    /// Number of live shapes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShapeHandle, &Shape)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.pixels > 0)
            .map(|(i, s)| (ShapeHandle(i as u32), s))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

/// Advances the shape state of the cell at `(x, y)` from its fresh read color.
pub(super) fn update(
    cells: &mut [Cell],
    shapes: &mut ShapeArena,
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    settings: &CameraSettings,
) {
    let i = x + y * width;
    let read = cells[i].read;
    let member = cells[i].valid && read.any_at_least(settings.shape);

    let left = x.saturating_sub(1);
    let right = (x + 1).min(width - 1);
    let bottom = y.saturating_sub(1);
    let top = (y + 1).min(height - 1);
    let neighbours = move || {
        (left..=right).flat_map(move |xx| (bottom..=top).map(move |yy| xx + yy * width))
    };

    match cells[i].shape {
        None if member => {
            let found = neighbours().find_map(|j| cells[j].shape);
            let handle = match found {
                Some(handle) => {
                    shapes.join(handle, read);
                    handle
                }
                None => shapes.allocate(read),
            };
            let cell = &mut cells[i];
            cell.shape = Some(handle);
            cell.shape_added = read;
            cell.shape_color = Color::BLACK;
        }
        None => {}
        Some(handle) if member => {
            shapes.replace(handle, cells[i].shape_added, read);
            let border = neighbours().any(|j| cells[j].shape != Some(handle));
            let gain = if border {
                settings.border
            } else {
                settings.inside
            };
            let united = read.lerp(shapes.average(handle), settings.unite) * gain;

            let cell = &mut cells[i];
            cell.shape_added = read;
            cell.shape_color = united.finite();
        }
        Some(handle) => {
            shapes.leave(handle, cells[i].shape_added);
            let cell = &mut cells[i];
            cell.shape = None;
            cell.shape_added = Color::BLACK;
            cell.shape_color = Color::BLACK;
        }
    }
}
