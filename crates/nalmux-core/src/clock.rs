//! 采样时钟: 把固定帧率换算成容器时间基下的采样时长.
//!
//! 每次封装只计算一次时长, 之后的所有采样都使用同一个值 (恒定帧率).

use log::debug;

use crate::error::{MuxError, MuxResult};
use crate::rational::Rational;

/// MP4 视频轨道的惯用时间基 (90 kHz), 与帧率无关
pub const MP4_TIMESCALE: u32 = 90_000;

/// 计算单个采样的时长 (时间基刻度)
///
/// `timescale / fps`, 整数除法. 例如 `duration_ticks(90000, 30) == 3000`.
pub fn duration_ticks(timescale: u32, fps: u32) -> MuxResult<u32> {
    if fps == 0 {
        return Err(MuxError::InvalidArgument("帧率不能为 0".into()));
    }
    let ticks = timescale / fps;
    if ticks == 0 {
        return Err(MuxError::InvalidArgument(format!(
            "帧率 {fps} 超过时间基 {timescale}, 采样时长为 0"
        )));
    }
    Ok(ticks)
}

/// 恒定帧率采样时钟
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleClock {
    /// 时间基 (每秒刻度数)
    timescale: u32,
    /// 每个采样的时长
    duration: u32,
}

impl SampleClock {
    /// 以整数帧率创建
    pub fn new(timescale: u32, fps: u32) -> MuxResult<Self> {
        let duration = duration_ticks(timescale, fps)?;
        Ok(Self {
            timescale,
            duration,
        })
    }

    /// 以有理数帧率创建 (如 30000/1001)
    ///
    /// 时长 = timescale * den / num, 整数帧率时与 [`duration_ticks`] 结果一致.
    pub fn from_frame_rate(timescale: u32, frame_rate: Rational) -> MuxResult<Self> {
        if !frame_rate.is_positive() {
            return Err(MuxError::InvalidArgument(format!(
                "帧率必须为正数: {frame_rate}"
            )));
        }
        let rate = frame_rate.reduce();
        if rate.den == 1 && rate.num > 0 {
            return Self::new(timescale, rate.num.unsigned_abs());
        }
        // 分子分母同号, 按绝对值计算
        let ticks = u64::from(timescale) * u64::from(rate.den.unsigned_abs())
            / u64::from(rate.num.unsigned_abs());
        let duration = u32::try_from(ticks).map_err(|_| {
            MuxError::InvalidArgument(format!("帧率 {frame_rate} 对应的采样时长溢出"))
        })?;
        if duration == 0 {
            return Err(MuxError::InvalidArgument(format!(
                "帧率 {frame_rate} 超过时间基 {timescale}, 采样时长为 0"
            )));
        }
        debug!("采样时钟: timescale={timescale}, 帧率={rate}, 时长={duration}");
        Ok(Self {
            timescale,
            duration,
        })
    }

    /// 时间基
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    /// 每个采样的时长
    pub fn duration_ticks(&self) -> u32 {
        self.duration
    }

    /// 刻度换算为秒
    pub fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        if self.timescale == 0 {
            return f64::NAN;
        }
        ticks as f64 / f64::from(self.timescale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ticks_common_rates() {
        assert_eq!(duration_ticks(90000, 30).unwrap(), 3000);
        assert_eq!(duration_ticks(90000, 25).unwrap(), 3600);
        assert_eq!(duration_ticks(90000, 60).unwrap(), 1500);
        // 整数除法向下取整
        assert_eq!(duration_ticks(90000, 7).unwrap(), 12857);
    }

    #[test]
    fn test_duration_ticks_rejects_zero() {
        assert!(matches!(
            duration_ticks(90000, 0),
            Err(MuxError::InvalidArgument(_))
        ));
        assert!(duration_ticks(10, 30).is_err());
    }

    #[test]
    fn test_clock_constant_duration() {
        let clock = SampleClock::new(MP4_TIMESCALE, 30).unwrap();
        assert_eq!(clock.duration_ticks(), 3000);
        assert_eq!(clock.timescale(), MP4_TIMESCALE);
        assert!((clock.ticks_to_seconds(30 * 3000) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_fractional_rate() {
        let clock = SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::new(30000, 1001)).unwrap();
        assert_eq!(clock.duration_ticks(), 3003);

        let integer = SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::new(25, 1)).unwrap();
        assert_eq!(integer, SampleClock::new(MP4_TIMESCALE, 25).unwrap());
    }

    #[test]
    fn test_clock_rejects_non_positive_rate() {
        assert!(SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::new(0, 1)).is_err());
        assert!(SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::new(-30, 1)).is_err());
        assert!(SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::UNDEFINED).is_err());
    }

    #[test]
    fn test_clock_extreme_rate_does_not_overflow() {
        // i32::MIN / -1 无法约分, 时长为 0
        let err = SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::new(i32::MIN, -1))
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidArgument(_)));

        // 负分子负分母等价于正帧率
        let clock = SampleClock::from_frame_rate(MP4_TIMESCALE, Rational::new(-25, -1)).unwrap();
        assert_eq!(clock.duration_ticks(), 3600);
    }
}
