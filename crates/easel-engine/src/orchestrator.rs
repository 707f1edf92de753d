use std::path::{Path, PathBuf};
use std::sync::Arc;

use easel_contracts::credentials::missing_credential;
use easel_contracts::history::HistoryEntry;
use easel_contracts::providers::{status_endpoint, ProviderDescriptor};
use easel_contracts::request::{Capability, GenerationRequest, ImageSize, MaskMode, MaskSpec};
use easel_contracts::{EaselError, Result};

use crate::backends::{Backend, CallContext, PreparedCall};
use crate::codec::{decode_envelope, load_image_source, normalize_to_square_rgba, Decoded};
use crate::document::{Document, ElementRef, SelectedImage};
use crate::http::{HttpClient, ReqwestTransport, ThreadSleeper};
use crate::mask::{generate_mask, ShapeSelection};
use crate::placement::{place, Placement};
use crate::poll::{PollPolicy, Poller};

pub const BATCH_OFFSET: f64 = 50.0;

/// Values fixed for the whole of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    pub credential: Option<String>,
    pub proxy: Option<String>,
    pub local_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    pub directory: PathBuf,
    pub prefix: String,
}

impl SaveOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "ai_image".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub element: ElementRef,
    /// `None` when an existing element was replaced in place.
    pub placement: Option<Placement>,
    pub saved_path: Option<PathBuf>,
    pub byte_len: usize,
}

/// A batch item that failed while the rest of the batch carried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    pub operation: Capability,
    pub provider: &'static str,
    pub model: String,
    pub size: ImageSize,
    pub results: Vec<OperationResult>,
    pub failures: Vec<ItemFailure>,
    pub history: Vec<HistoryEntry>,
}

pub struct Orchestrator {
    http: HttpClient,
    poll: PollPolicy,
    save: Option<SaveOptions>,
}

impl Orchestrator {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            poll: PollPolicy::default(),
            save: None,
        }
    }

    /// Real network transport honouring the context's proxy.
    pub fn for_context(context: &OperationContext) -> Result<Self> {
        let transport = ReqwestTransport::new(context.proxy.as_deref())?;
        Ok(Self::new(HttpClient::new(
            Arc::new(transport),
            Arc::new(ThreadSleeper),
        )))
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    pub fn with_save(mut self, save: Option<SaveOptions>) -> Self {
        self.save = save;
        self
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn run(
        &self,
        descriptor: &'static ProviderDescriptor,
        request: &GenerationRequest,
        context: &OperationContext,
        document: &mut dyn Document,
    ) -> Result<OperationReport> {
        let credential = context
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if descriptor.requires_credential() && credential.is_none() {
            return Err(missing_credential(descriptor));
        }
        request.validate()?;

        let backend = Backend::for_provider(descriptor);
        if !backend.supports(request.operation) {
            return Err(backend.unsupported(request.operation));
        }

        let model = if descriptor.supports_model(&request.model) {
            request.model.as_str()
        } else {
            tracing::debug!(
                provider = descriptor.name,
                requested = %request.model,
                "model not offered by provider; using its default"
            );
            descriptor.default_model()
        };
        let size = match request.requested_size() {
            Ok(size) => descriptor.clamp_size(size),
            Err(err) => {
                tracing::warn!(error = %err, "unparseable size; using provider default");
                descriptor.default_size()
            }
        };
        let call = CallContext {
            descriptor,
            credential,
            model,
            size,
            local_endpoint: context.local_endpoint.as_deref(),
        };
        tracing::debug!(
            provider = descriptor.name,
            operation = %request.operation,
            model,
            size = %size,
            "starting operation"
        );

        let (results, failures) = match request.operation {
            Capability::Generate => self.generate(&backend, &call, request, document)?,
            Capability::Edit => (vec![self.edit(&backend, &call, request, document)?], Vec::new()),
            Capability::Variation | Capability::Img2Img => (
                vec![self.transform(&backend, &call, request, document)?],
                Vec::new(),
            ),
        };

        let history = results
            .iter()
            .map(|_| HistoryEntry::new(request, descriptor.name, model, &size.to_string()))
            .collect();
        tracing::info!(
            provider = descriptor.name,
            operation = %request.operation,
            images = results.len(),
            failed = failures.len(),
            "operation complete"
        );
        Ok(OperationReport {
            operation: request.operation,
            provider: descriptor.name,
            model: model.to_string(),
            size,
            results,
            failures,
            history,
        })
    }

    /// Issues the batch one item at a time. A failed item is recorded and
    /// skipped; the run fails only when no item succeeded.
    fn generate(
        &self,
        backend: &Backend,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        document: &mut dyn Document,
    ) -> Result<(Vec<OperationResult>, Vec<ItemFailure>)> {
        let batch_count = request.batch_count();
        let base = self.placement(call, request, document);
        let mut results = Vec::with_capacity(batch_count as usize);
        let mut failures = Vec::new();
        let mut first_error = None;
        for index in 0..batch_count {
            let placement = if batch_count > 1 {
                base.offset(BATCH_OFFSET * f64::from(index))
            } else {
                base
            };
            match self.generate_one(backend, call, request, document, placement) {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::warn!(
                        item = index + 1,
                        batch = batch_count,
                        error = %err,
                        "batch item failed"
                    );
                    failures.push(ItemFailure {
                        index,
                        message: err.to_string(),
                    });
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) if results.is_empty() => Err(err),
            _ => Ok((results, failures)),
        }
    }

    fn generate_one(
        &self,
        backend: &Backend,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        document: &mut dyn Document,
        placement: Placement,
    ) -> Result<OperationResult> {
        let prepared = backend.generator().build_generate(call, request)?;
        let bytes = self.execute(call, prepared)?;
        let element = document.insert_image(&bytes, placement)?;
        Ok(OperationResult {
            element,
            placement: Some(placement),
            saved_path: self.save_to_disk(&bytes, request),
            byte_len: bytes.len(),
        })
    }

    fn edit(
        &self,
        backend: &Backend,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        document: &mut dyn Document,
    ) -> Result<OperationResult> {
        let editor = backend
            .editor()
            .ok_or_else(|| backend.unsupported(Capability::Edit))?;
        let selected = selected_image(document, "Please select an image to edit.")?;
        let edge = request.normalization_edge();
        let image = self.normalized_source(&selected, edge)?;

        let shapes = document.selected_shape_bounding_boxes();
        let mask_spec = if request.use_selection_as_mask && !shapes.is_empty() {
            MaskSpec {
                mode: MaskMode::ShapeDerived,
                ..request.mask.clone()
            }
        } else {
            request.mask.clone()
        };
        let selection = (!shapes.is_empty()).then(|| ShapeSelection {
            boxes: &shapes,
            viewport: document.viewport_size(),
        });
        let mask = generate_mask(&mask_spec, edge, selection)?;
        tracing::debug!(
            mode = ?mask_spec.mode,
            feather = mask_spec.feather_radius,
            opacity = mask_spec.opacity,
            edge,
            "built edit mask"
        );

        let prepared = editor.build_edit(call, request, &image, &mask)?;
        let bytes = self.execute(call, prepared)?;
        document.replace_image(&selected.element, &bytes)?;
        Ok(OperationResult {
            element: selected.element,
            placement: None,
            saved_path: self.save_to_disk(&bytes, request),
            byte_len: bytes.len(),
        })
    }

    fn transform(
        &self,
        backend: &Backend,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        document: &mut dyn Document,
    ) -> Result<OperationResult> {
        let operation = request.operation;
        let missing_selection = match operation {
            Capability::Variation => "Please select an image to create a variation of.",
            _ => "Please select an image for img2img transformation.",
        };
        let selected = selected_image(document, missing_selection)?;
        let image = self.normalized_source(&selected, request.normalization_edge())?;

        let prepared = match operation {
            Capability::Variation => backend
                .variator()
                .ok_or_else(|| backend.unsupported(operation))?
                .build_variation(call, request, &image)?,
            _ => backend
                .transformer()
                .ok_or_else(|| backend.unsupported(operation))?
                .build_img2img(call, request, &image)?,
        };
        let bytes = self.execute(call, prepared)?;
        let placement = self.placement(call, request, document);
        let element = document.insert_image(&bytes, placement)?;
        Ok(OperationResult {
            element,
            placement: Some(placement),
            saved_path: self.save_to_disk(&bytes, request),
            byte_len: bytes.len(),
        })
    }

    fn placement(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        document: &dyn Document,
    ) -> Placement {
        place(
            &request.placement,
            call.size,
            document.viewport_size(),
            &document.selected_shape_bounding_boxes(),
        )
    }

    fn normalized_source(&self, selected: &SelectedImage, edge: u32) -> Result<Vec<u8>> {
        let source = load_image_source(&selected.locator, &self.http)?;
        normalize_to_square_rgba(&source, edge)
    }

    /// Sends the call and turns whatever the provider answers with into
    /// image bytes, polling asynchronous predictions to completion.
    fn execute(&self, call: &CallContext<'_>, prepared: PreparedCall) -> Result<Vec<u8>> {
        tracing::debug!(url = %prepared.request.url, "sending provider request");
        let payload = self.http.send(&prepared.request)?;
        match decode_envelope(prepared.envelope, &payload)? {
            Decoded::Image(bytes) => Ok(bytes),
            Decoded::Url(url) => self.http.download(&url),
            Decoded::Pending { prediction_id } => {
                let status_url = status_endpoint(call.descriptor, &prediction_id)?;
                let headers = call
                    .credential
                    .and_then(|credential| call.descriptor.auth.header_value(credential))
                    .map(|value| vec![("Authorization".to_string(), value)])
                    .unwrap_or_default();
                let urls = Poller::new(&self.http, self.poll).wait(&status_url, &headers)?;
                let first = urls.first().ok_or_else(|| {
                    EaselError::Decode("prediction finished without output".to_string())
                })?;
                self.http.download(first)
            }
        }
    }

    fn save_to_disk(&self, bytes: &[u8], request: &GenerationRequest) -> Option<PathBuf> {
        let save = self.save.as_ref()?;
        match write_result(&save.directory, &save.prefix, request.seed(), bytes) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(
                    directory = %save.directory.display(),
                    error = %err,
                    "failed to save generated image"
                );
                None
            }
        }
    }
}

fn selected_image(document: &dyn Document, message: &str) -> Result<SelectedImage> {
    document
        .selected_image_source()
        .ok_or_else(|| EaselError::Validation(message.to_string()))
}

/// `{prefix}_{YYYYmmdd_HHMMSS}[_seed{N}].png`, numbered when the name is
/// already taken.
pub fn result_file_name(prefix: &str, stamp: &str, seed: Option<i64>) -> String {
    match seed {
        Some(seed) => format!("{prefix}_{stamp}_seed{seed}.png"),
        None => format!("{prefix}_{stamp}.png"),
    }
}

fn write_result(
    directory: &Path,
    prefix: &str,
    seed: Option<i64>,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(directory)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let file_name = result_file_name(prefix, &stamp, seed);
    let mut path = directory.join(&file_name);
    let mut counter = 1;
    while path.exists() {
        let stem = file_name.trim_end_matches(".png");
        path = directory.join(format!("{stem}_{counter}.png"));
        counter += 1;
    }
    std::fs::write(&path, bytes)?;
    Ok(path)
}
