/// The phase an export is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    LoadingImages,
    Rendering,
    Links,
    Encoding,
}

/// `completed` of `total` units of `stage` are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub completed: usize,
    pub total: usize,
}

/// Receives progress events; a `None` reporter drops them.
#[derive(Default)]
pub struct Reporter<'a> {
    sink: Option<&'a mut (dyn FnMut(Progress) + Send)>,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a mut (dyn FnMut(Progress) + Send)) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn report(&mut self, stage: Stage, completed: usize, total: usize) {
        tracing::trace!(?stage, completed, total, "progress");
        if let Some(sink) = self.sink.as_mut() {
            sink(Progress {
                stage,
                completed,
                total,
            });
        }
    }
}
