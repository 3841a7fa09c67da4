use super::{TrainOutcome, Trainer, crop_to_target, scalar};
use crate::checkpoint::{CheckpointWriter, snapshot_name};
use crate::data::PinoDataSource;
use crate::error::{PinoError, Result};
use crate::loss::{BurgersLoss, BurgersResidual, LpLoss};
use crate::mesh::{mollifier, mollify};
use crate::metrics::{BatchLosses, EpochAccumulator, EpochAverage, MetricNames, MetricsHistory};
use crate::model::NeuralOperator;
use burn::lr_scheduler::LrScheduler;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::Tensor;
use burn::tensor::backend::{AutodiffBackend, Backend};

fn apply<B: Backend>(pred: Tensor<B, 3>, mollifier: Option<&Tensor<B, 2>>) -> Result<Tensor<B, 3>> {
    match mollifier {
        Some(m) => mollify(pred, m),
        None => Ok(pred),
    }
}

impl<C: CheckpointWriter> Trainer<'_, C> {
    /// バーガース方程式のPINOを学習します。
    ///
    /// 物理損失は初期条件の残差 `loss_u` とPDE残差 `loss_f` を返し、
    /// `ic_loss · loss_u + f_loss · loss_f + xy_loss · data_loss` で逆伝播します。
    /// エポック平均はバッチ数による単純平均です。
    /// `snapshot_every` エポックごと（エポック0を含む）と学習の最後にチェックポイントを保存します。
    pub fn train_burgers<B, M, O, S, D, P>(
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
        P: BurgersResidual<B>,
    {
        self.start_run()?;

        let data_weight = self.config.xy_loss()?;
        let f_weight = self.config.f_loss()?;
        let ic_weight = self.config.ic_loss()?;
        let epochs = self.config.epochs()?;
        let padding = self.options.padding;
        let pde_padding = self.options.pde_padding;
        let snapshot_every = self.options.snapshot_every;
        let lp_loss = LpLoss::default();

        let (data_mollifier, pde_mollifier) = if self.options.burgers_mollifier {
            let mesh = loader.mesh().ok_or(PinoError::MissingMesh("mesh"))?;
            let pde_mesh = loader.pde_mesh().ok_or(PinoError::MissingMesh("pde mesh"))?;
            (
                Some(mollifier(mesh)?.to_device(device)),
                Some(mollifier(pde_mesh)?.to_device(device)),
            )
        } else {
            (None, None)
        };

        tracing::info!(
            epochs,
            data_weight,
            f_weight,
            ic_weight,
            padding,
            pde_padding,
            "Burgers training started"
        );

        let progress = self.progress_bar(epochs);
        let mut history = MetricsHistory::new();
        let mut lr = scheduler.step();

        for epoch in 0..epochs {
            let mut running = EpochAccumulator::new(EpochAverage::PerBatch);

            for batch in loader.batches() {
                let batch = batch.to_device(device);
                let batch_size = batch.len();

                let out = crop_to_target(model.forward(batch.x, padding), padding, batch.y.dims())?;
                let out = apply(out, data_mollifier.as_ref())?;
                let data_loss = lp_loss.forward(out, batch.y);

                // t = 0 の行の第1チャネルが初期条件
                let [n, _, x, _] = batch.pde_x.dims();
                let u0 = batch.pde_x.clone().slice([0..n, 0..1, 0..x, 0..1]).reshape([n, x]);
                let pde_out = model.forward(batch.pde_x, pde_padding);
                let pde_out = crop_to_target(pde_out, pde_padding, batch.pde_y.dims())?;
                let pde_out = apply(pde_out, pde_mollifier.as_ref())?;
                let BurgersLoss { loss_u, loss_f } = physics.pino_loss(pde_out, u0);

                let total_loss = loss_u.mul_scalar(ic_weight)
                    + loss_f.clone().mul_scalar(f_weight)
                    + data_loss.clone().mul_scalar(data_weight);
                let losses = BatchLosses {
                    total: scalar(&total_loss),
                    data: scalar(&data_loss),
                    physics: scalar(&loss_f),
                };

                let grads = GradientsParams::from_grads(total_loss.backward(), &model);
                model = optimizer.step(lr, model, grads);

                running.add(batch_size, losses);
            }

            lr = scheduler.step();
            let metrics = running.finish(loader.num_batches());

            progress.set_message(format!(
                "Epoch {epoch}, train loss: {:.5} train f error: {:.5}; data l2 error: {:.5}",
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
            self.log_epoch(epoch, &metrics, &MetricNames::BURGERS)?;
            history.push(metrics);

            if snapshot_every > 0 && epoch % snapshot_every == 0 {
                let save_dir = self.config.save_dir()?;
                let name = snapshot_name(&self.config.save_name()?, epoch);
                self.checkpoints
                    .write::<B, M, O>(&save_dir, &name, epoch + 1, &model, &optimizer)?;
            }
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
