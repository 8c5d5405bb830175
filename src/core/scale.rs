use crate::error::{ViewerError, ViewerResult};

/// Linear mapping between a value domain and a pixel span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain_start: f64,
    domain_end: f64,
}

impl LinearScale {
    pub fn new(domain_start: f64, domain_end: f64) -> ViewerResult<Self> {
        if !domain_start.is_finite() || !domain_end.is_finite() || domain_start == domain_end {
            return Err(ViewerError::InvalidData(
                "scale domain must be finite and non-zero".to_owned(),
            ));
        }

        Ok(Self {
            domain_start,
            domain_end,
        })
    }

    #[must_use]
    pub fn domain(self) -> (f64, f64) {
        (self.domain_start, self.domain_end)
    }

    #[must_use]
    pub fn span(self) -> f64 {
        self.domain_end - self.domain_start
    }

    pub fn domain_to_pixel(self, value: f64, width: f64) -> ViewerResult<f64> {
        check_width(width)?;
        if !value.is_finite() {
            return Err(ViewerError::InvalidData("value must be finite".to_owned()));
        }

        let normalized = (value - self.domain_start) / self.span();
        Ok(normalized * width)
    }

    pub fn pixel_to_domain(self, pixel: f64, width: f64) -> ViewerResult<f64> {
        check_width(width)?;
        if !pixel.is_finite() {
            return Err(ViewerError::InvalidData("pixel must be finite".to_owned()));
        }

        let normalized = pixel / width;
        Ok(self.domain_start + normalized * self.span())
    }
}

fn check_width(width: f64) -> ViewerResult<()> {
    if !width.is_finite() || width <= 0.0 {
        return Err(ViewerError::InvalidData(format!(
            "pixel width must be positive, got {width}"
        )));
    }
    Ok(())
}
