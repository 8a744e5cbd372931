//! Broadcast-time "fast clock" weekday/month enums and the tick
//! accumulator that turns 100 ms ticks into simulated-minute advances.

use num_enum::{FromPrimitive, IntoPrimitive};

/// Week day for fast clock implementation
///
/// The enum values represent the VLCB fast clock protocol specification
/// for week days.
///
/// Default value is `1` ([`FastClockWeekday::Sunday`])
#[derive(FromPrimitive, IntoPrimitive, Debug, Clone, PartialEq, Eq, Copy)]
#[repr(u8)]
pub enum FastClockWeekday {
    #[default]
    Sunday = 1,
    Monday = 2,
    Tuesday = 3,
    Wednesday = 4,
    Thursday = 5,
    Friday = 6,
    Saturday = 7,
}

/// Month for fast clock implementation
///
/// The enum values represent the VLCB fast clock protocol specification
/// for months.
///
/// Default value is `1` ([`FastClockMonth::January`])
#[derive(FromPrimitive, IntoPrimitive, Debug, Clone, PartialEq, Eq, Copy)]
#[repr(u8)]
pub enum FastClockMonth {
    #[default]
    January = 1,
    February = 2,
    March = 3,
    April = 4,
    May = 5,
    June = 6,
    July = 7,
    August = 8,
    September = 9,
    October = 10,
    November = 11,
    December = 12,
}

impl FastClockMonth {
    fn days(self, year: i32) -> u8 {
        match self {
            FastClockMonth::January => 31,
            FastClockMonth::February => {
                if is_leap_year(year) {
                    29
                } else {
                    28
                }
            }
            FastClockMonth::March => 31,
            FastClockMonth::April => 30,
            FastClockMonth::May => 31,
            FastClockMonth::June => 30,
            FastClockMonth::July => 31,
            FastClockMonth::August => 31,
            FastClockMonth::September => 30,
            FastClockMonth::October => 31,
            FastClockMonth::November => 30,
            FastClockMonth::December => 31,
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Accumulator threshold for one simulated minute at rate 4 (1.0x),
/// reached after 600 ticks of 100 ms each.
pub const MINUTE_THRESHOLD: i32 = 240_000;
const TICK_UNIT: i32 = 100;

/// A simulated date/time plus the fractional-minute tick accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastClock {
    pub year: i32,
    pub month: FastClockMonth,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    accumulator: i32,
}

impl FastClock {
    pub fn new(year: i32, month: FastClockMonth, day: u8, hour: u8, minute: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            accumulator: 0,
        }
    }

    /// Feed one 100 ms tick at the given Q10.2 fixed-point rate (4 = 1.0x).
    ///
    /// Returns the (possibly negative) number of whole simulated minutes
    /// this tick advanced the clock by.
    pub fn tick(&mut self, rate_q10_2: i16) -> i32 {
        self.accumulator += rate_q10_2 as i32 * TICK_UNIT;

        let mut minutes = 0;
        while self.accumulator >= MINUTE_THRESHOLD {
            self.accumulator -= MINUTE_THRESHOLD;
            self.advance_one_minute();
            minutes += 1;
        }
        while self.accumulator <= -MINUTE_THRESHOLD {
            self.accumulator += MINUTE_THRESHOLD;
            self.rewind_one_minute();
            minutes -= 1;
        }
        minutes
    }

    fn advance_one_minute(&mut self) {
        self.minute += 1;
        if self.minute >= 60 {
            self.minute = 0;
            self.hour += 1;
            if self.hour >= 24 {
                self.hour = 0;
                self.day += 1;
                let days_in_month = self.month.days(self.year);
                if self.day > days_in_month {
                    self.day = 1;
                    let next = self.month as u8 + 1;
                    if next > 12 {
                        self.month = FastClockMonth::January;
                        self.year += 1;
                    } else {
                        self.month = FastClockMonth::from(next);
                    }
                }
            }
        }
    }

    fn rewind_one_minute(&mut self) {
        if self.minute == 0 {
            self.minute = 59;
            if self.hour == 0 {
                self.hour = 23;
                if self.day == 1 {
                    let prev_month_num = if self.month as u8 == 1 {
                        12
                    } else {
                        self.month as u8 - 1
                    };
                    if self.month as u8 == 1 {
                        self.year -= 1;
                    }
                    self.month = FastClockMonth::from(prev_month_num);
                    self.day = self.month.days(self.year);
                } else {
                    self.day -= 1;
                }
            } else {
                self.hour -= 1;
            }
        } else {
            self.minute -= 1;
        }
    }
}
