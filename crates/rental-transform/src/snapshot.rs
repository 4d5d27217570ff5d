use polars::prelude::DataFrame;
use rental_model::TableKind;

/// The three input tables of one run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub listings: DataFrame,
    pub calendar: DataFrame,
    pub reviews: DataFrame,
}

impl Snapshot {
    pub fn new(listings: DataFrame, calendar: DataFrame, reviews: DataFrame) -> Self {
        Self {
            listings,
            calendar,
            reviews,
        }
    }

    pub fn table(&self, kind: TableKind) -> &DataFrame {
        match kind {
            TableKind::Listings => &self.listings,
            TableKind::Calendar => &self.calendar,
            TableKind::Reviews => &self.reviews,
        }
    }

    pub fn table_mut(&mut self, kind: TableKind) -> &mut DataFrame {
        match kind {
            TableKind::Listings => &mut self.listings,
            TableKind::Calendar => &mut self.calendar,
            TableKind::Reviews => &mut self.reviews,
        }
    }

    /// `(rows, columns)` for each table, in listings/calendar/reviews order.
    pub fn shapes(&self) -> [(usize, usize); 3] {
        [
            self.listings.shape(),
            self.calendar.shape(),
            self.reviews.shape(),
        ]
    }
}
