//! 时钟抽象
//!
//! 分诊依赖"今天"，通过注入时钟而不是直接读取系统时间，便于测试。

use chrono::NaiveDate;

/// 提供当前日期
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// 系统本地时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// 固定日期时钟
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let clock: &dyn Clock = &FixedClock(day);
        assert_eq!(clock.today(), day);
    }
}
