use super::{TrainOutcome, Trainer, crop_to_target, scalar};
use crate::checkpoint::CheckpointWriter;
use crate::data::PinoDataSource;
use crate::error::{PinoError, Result};
use crate::loss::{DarcyResidual, LpLoss};
use crate::mesh::{mollifier, mollify};
use crate::metrics::{BatchLosses, EpochAccumulator, EpochAverage, MetricNames, MetricsHistory};
use crate::model::NeuralOperator;
use burn::lr_scheduler::LrScheduler;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::Tensor;
use burn::tensor::backend::AutodiffBackend;

impl<C: CheckpointWriter> Trainer<'_, C> {
    /// ダルシー流のPINOを学習します。
    ///
    /// バッチごとに教師データのデータ損失と、`train.f_loss` が正のときだけ
    /// コロケーション点の物理残差損失を計算し、
    /// `xy_loss · data_loss + f_loss · f_loss` で逆伝播します。
    /// エポック平均はサンプル数で重み付けします。
    /// 学習の最後にチェックポイントを1つ保存します。
    pub fn train_darcy<B, M, O, S, D, P>(
        &mut self,
        mut model: M,
        mut optimizer: O,
        scheduler: &mut S,
        loader: &D,
        physics: &P,
        device: &B::Device,
    ) -> Result<TrainOutcome<M, O>>
    where
        B: AutodiffBackend,
        M: NeuralOperator<B>,
        O: Optimizer<M, B>,
        S: LrScheduler,
        D: PinoDataSource<B>,
        P: DarcyResidual<B>,
    {
        self.start_run()?;

        let data_weight = self.config.xy_loss()?;
        let f_weight = self.config.f_loss()?;
        let epochs = self.config.epochs()?;
        let padding = self.options.padding;
        let pde_padding = self.options.pde_padding;
        let lp_loss = LpLoss::default();

        let mesh = loader.mesh().ok_or(PinoError::MissingMesh("mesh"))?;
        let data_mollifier = mollifier(mesh)?.to_device(device);
        let pde_mesh = loader.pde_mesh().ok_or(PinoError::MissingMesh("pde mesh"))?;
        let pde_mollifier = mollifier(pde_mesh)?.to_device(device);

        tracing::info!(epochs, data_weight, f_weight, padding, pde_padding, "Darcy training started");

        let progress = self.progress_bar(epochs);
        let mut history = MetricsHistory::new();
        let mut lr = scheduler.step();

        for epoch in 0..epochs {
            let mut running = EpochAccumulator::new(EpochAverage::PerSample);

            for batch in loader.batches() {
                let batch = batch.to_device(device);
                let batch_size = batch.len();

                let pred = crop_to_target(model.forward(batch.x, padding), padding, batch.y.dims())?;
                let pred = mollify(pred, &data_mollifier)?;
                let data_loss = lp_loss.forward(pred, batch.y);

                let f_loss = if f_weight > 0.0 {
                    let [n, h, w, _] = batch.pde_x.dims();
                    // 第1チャネルが透水係数場
                    let a = batch.pde_x.clone().slice([0..n, 0..h, 0..w, 0..1]).reshape([n, h, w]);
                    let pred = model.forward(batch.pde_x, pde_padding);
                    let pred = crop_to_target(pred, pde_padding, batch.pde_y.dims())?;
                    let pred = mollify(pred, &pde_mollifier)?;
                    physics.darcy_loss(pred, a)
                } else {
                    Tensor::zeros([1], device)
                };

                let loss = data_loss.clone().mul_scalar(data_weight) + f_loss.clone().mul_scalar(f_weight);
                let losses = BatchLosses {
                    total: scalar(&loss),
                    data: scalar(&data_loss),
                    physics: scalar(&f_loss),
                };

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);

                running.add(batch_size, losses);
            }

            lr = scheduler.step();
            let metrics = running.finish(loader.num_samples());

            progress.set_message(format!(
                "Epoch: {epoch}, train loss: {:.5}, f_loss: {:.5}, data loss: {:.5}",
                metrics.train_loss, metrics.f_loss, metrics.data_loss
            ));
            progress.inc(1);
            tracing::debug!(
                epoch,
                train_loss = metrics.train_loss,
                f_loss = metrics.f_loss,
                data_loss = metrics.data_loss,
                lr,
                "Epoch finished"
            );
            self.log_epoch(epoch, &metrics, &MetricNames::DARCY)?;
            history.push(metrics);
        }
        progress.finish();

        let save_dir = self.config.save_dir()?;
        let save_name = self.config.save_name()?;
        self.checkpoints
            .write::<B, M, O>(&save_dir, &save_name, epochs, &model, &optimizer)?;

        self.end_run()?;
        println!("Done!");

        Ok(TrainOutcome {
            model,
            optimizer,
            history,
        })
    }
}
