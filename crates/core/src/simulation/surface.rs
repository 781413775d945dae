/// Per-column snow depth for the snowfall effect.
///
/// Heights only grow. Column `x` is read and written only by the flake that
/// currently occupies it.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationSurface {
    heights: Vec<f32>,
}

impl AccumulationSurface {
    pub fn new(width: usize) -> Self {
        Self {
            heights: vec![0.0; width],
        }
    }

    pub fn width(&self) -> usize {
        self.heights.len()
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Column under horizontal position `x`, clamped into the surface.
    pub fn column(&self, x: f32) -> usize {
        let last = self.heights.len().saturating_sub(1);
        if !(x > 0.0) {
            return 0;
        }
        (x.floor() as usize).min(last)
    }

    pub fn height(&self, column: usize) -> f32 {
        self.heights.get(column).copied().unwrap_or(0.0)
    }

    /// Screen y of the snow line in `column` for a screen `screen_height` tall.
    pub fn contact_y(&self, column: usize, screen_height: f32) -> f32 {
        screen_height - self.height(column)
    }

    /// Grows `column` by `amount` and returns its new height. Negative
    /// amounts are ignored.
    pub fn deposit(&mut self, column: usize, amount: f32) -> f32 {
        match self.heights.get_mut(column) {
            Some(height) => {
                *height += amount.max(0.0);
                *height
            }
            None => 0.0,
        }
    }

    pub fn total_depth(&self) -> f32 {
        self.heights.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_clamp_to_surface() {
        let surface = AccumulationSurface::new(10);
        assert_eq!(surface.column(-3.0), 0);
        assert_eq!(surface.column(4.7), 4);
        assert_eq!(surface.column(25.0), 9);
        assert_eq!(surface.column(f32::NAN), 0);
    }

    #[test]
    fn deposits_only_grow() {
        let mut surface = AccumulationSurface::new(4);
        assert_eq!(surface.deposit(2, 5.0), 5.0);
        assert_eq!(surface.deposit(2, -3.0), 5.0);
        assert_eq!(surface.deposit(9, 1.0), 0.0);
        assert_eq!(surface.contact_y(2, 100.0), 95.0);
        assert_eq!(surface.total_depth(), 5.0);
    }
}
