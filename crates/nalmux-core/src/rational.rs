//! 有理数类型, 用于帧率与时间基.
//!
//! 帧率 30000/1001 表示 29.97fps, 时间基 1/90000 表示 90kHz 时钟.

use std::fmt;
use std::str::FromStr;

use crate::error::MuxError;

/// 有理数, 由分子和分母组成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    ///
    /// # 参数
    /// - `num`: 分子
    /// - `den`: 分母 (不应为 0)
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 是否为正数 (分子分母同号且均不为 0)
    pub const fn is_positive(&self) -> bool {
        self.num != 0 && self.den != 0 && (self.num > 0) == (self.den > 0)
    }

    /// 对有理数进行约分, 分母保持为正
    ///
    /// 结果超出 i32 范围时 (如 `i32::MIN / -1`) 原样返回.
    pub fn reduce(self) -> Self {
        if self.den == 0 {
            return self;
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs());
        if g == 0 {
            return self;
        }
        let sign: i64 = if self.den < 0 { -1 } else { 1 };
        let num = sign * i64::from(self.num) / i64::from(g);
        let den = sign * i64::from(self.den) / i64::from(g);
        match (i32::try_from(num), i32::try_from(den)) {
            (Ok(num), Ok(den)) => Self { num, den },
            _ => self,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 解析帧率字符串 (如 "25", "29.97" 或 "30000/1001")
impl FromStr for Rational {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || MuxError::InvalidArgument(format!("无法解析有理数: '{s}'"));
        if let Some((num, den)) = s.split_once('/') {
            let num: i32 = num.trim().parse().map_err(|_| invalid())?;
            let den: i32 = den.trim().parse().map_err(|_| invalid())?;
            return Ok(Self::new(num, den));
        }
        if let Ok(int) = s.parse::<i32>() {
            return Ok(Self::new(int, 1));
        }
        let value: f64 = s.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value <= 0.0 || value > f64::from(i32::MAX) / 1000.0 {
            return Err(invalid());
        }
        Ok(Self::new((value * 1000.0).round() as i32, 1000).reduce())
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
