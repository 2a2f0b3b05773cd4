//! 时间维度上的膨胀卷积

use crate::types::{GnnError, GnnResult};
use tch::{nn, nn::Module, Tensor};

/// inception 分支的卷积核宽度
pub const KERNEL_SET: [i64; 4] = [2, 3, 6, 7];

/// 最宽的卷积核，决定感受野
pub const MAX_KERNEL: i64 = 7;

fn temporal_conv(vs: nn::Path, c_in: i64, c_out: i64, kernel: i64, dilation: i64) -> nn::Conv2D {
    nn::conv(
        vs,
        c_in,
        c_out,
        [1, kernel],
        nn::ConvConfigND::<[i64; 2]> { dilation: [1, dilation], ..Default::default() },
    )
}

/// 多分支膨胀卷积
///
/// 四个分支共享同一个膨胀系数，输出按时间右对齐（裁剪到最宽分支的长度）
/// 后在通道维拼接。
#[derive(Debug)]
pub struct DilatedInception {
    tconv: Vec<nn::Conv2D>,
}

impl DilatedInception {
    pub fn new(vs: &nn::Path, c_in: i64, c_out: i64, dilation: i64) -> GnnResult<Self> {
        let branches = KERNEL_SET.len() as i64;
        if c_out % branches != 0 {
            return Err(GnnError::InvalidConfig(format!(
                "conv_channels ({}) 必须能被 {} 整除",
                c_out, branches
            )));
        }

        let tconv = KERNEL_SET
            .iter()
            .enumerate()
            .map(|(i, &kernel)| {
                temporal_conv(vs / format!("tconv_{}", i), c_in, c_out / branches, kernel, dilation)
            })
            .collect();

        Ok(Self { tconv })
    }
}

impl Module for DilatedInception {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let outputs: Vec<Tensor> = self.tconv.iter().map(|conv| xs.apply(conv)).collect();

        // 最宽的卷积核输出最短
        let len = outputs.last().map(|o| o.size()[3]).unwrap_or(0);
        let aligned: Vec<Tensor> = outputs
            .iter()
            .map(|o| {
                let t = o.size()[3];
                o.narrow(3, t - len, len)
            })
            .collect();

        Tensor::cat(&aligned, 1)
    }
}

/// 单核（宽度 7）膨胀卷积
#[derive(Debug)]
pub struct Dilated1D {
    tconv: nn::Conv2D,
}

impl Dilated1D {
    pub fn new(vs: &nn::Path, c_in: i64, c_out: i64, dilation: i64) -> Self {
        Self { tconv: temporal_conv(vs / "tconv", c_in, c_out, MAX_KERNEL, dilation) }
    }
}

impl Module for Dilated1D {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.tconv)
    }
}
