use crate::{common::*, mixin, ClassMap, Extract, ImageSize, Mixin, Parser};

/// A row of a CSV label file.
///
/// The box is given by its center and size relative to the image size.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CsvSample {
    pub image_file: String,
    pub class_name: String,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

/// The rows of one image with its size read from the image file.
#[derive(Debug, Clone)]
pub struct CsvImage {
    pub key: String,
    pub path: PathBuf,
    pub size: ImageSize,
    pub rows: Vec<CsvSample>,
}

/// Parses a CSV label file with one object per row.
///
/// The native key of an image is its path as written in the label file.
#[derive(Debug, Clone)]
pub struct CsvParser {
    image_dir: PathBuf,
    classes: ClassMap,
    images: IndexMap<String, Vec<CsvSample>>,
}

impl CsvParser {
    pub fn load(
        label_file: impl AsRef<Path>,
        image_dir: impl AsRef<Path>,
        classes: ClassMap,
    ) -> Result<Self> {
        let label_file = label_file.as_ref();

        let rows: Vec<CsvSample> = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(::csv::Trim::All)
            .from_path(label_file)
            .with_context(|| format!("failed to open label file '{}'", label_file.display()))?
            .deserialize()
            .collect::<Result<Vec<CsvSample>, _>>()
            .with_context(|| format!("failed to parse label file '{}'", label_file.display()))?;

        Ok(Self::new(rows, image_dir, classes))
    }

    pub fn new(
        rows: impl IntoIterator<Item = CsvSample>,
        image_dir: impl AsRef<Path>,
        classes: ClassMap,
    ) -> Self {
        let mut images: IndexMap<String, Vec<CsvSample>> = IndexMap::new();
        for row in rows {
            images.entry(row.image_file.clone()).or_default().push(row);
        }

        Self {
            image_dir: image_dir.as_ref().to_owned(),
            classes,
            images,
        }
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    fn rows<'a>(&'a self, image: &'a CsvImage) -> impl Iterator<Item = &'a CsvSample> {
        image
            .rows
            .iter()
            .filter(move |row| self.classes.is_whitelisted(&row.class_name))
    }
}

impl Parser for CsvParser {
    type Key = String;
    /// The index of the image in the label file.
    type Sample = usize;
    type Prepared = CsvImage;

    fn samples(&self) -> Result<Box<dyn Iterator<Item = Self::Sample> + '_>> {
        Ok(Box::new(0..self.images.len()))
    }

    fn prepare(&self, &index: &Self::Sample) -> Extract<Self::Prepared> {
        let (image_file, rows) = self
            .images
            .get_index(index)
            .ok_or_else(|| format_err!("image #{} does not exist", index))?;
        let path = self.image_dir.join(image_file);

        let imagesize::ImageSize { width, height } = imagesize::size(&path)
            .with_context(|| format!("failed to read the size of image '{}'", path.display()))?;

        Ok(CsvImage {
            key: image_file.clone(),
            path,
            size: ImageSize::try_from_wh([width, height])?,
            rows: rows.clone(),
        })
    }

    fn image_id(&self, image: &Self::Prepared) -> Self::Key {
        image.key.clone()
    }

    fn mixins(&self) -> Vec<Box<dyn Mixin<Self::Prepared> + '_>> {
        vec![
            mixin::filepath(|image: &CsvImage| Ok(image.path.clone())),
            mixin::size(|image: &CsvImage| Ok(image.size)),
            mixin::labels(move |image: &CsvImage| {
                let mut labels = vec![];
                for row in self.rows(image) {
                    labels.extend(self.classes.resolve(&row.class_name)?);
                }
                Ok(labels)
            }),
            mixin::bboxes(move |image: &CsvImage| {
                let (width, height) = (image.size.w(), image.size.h());
                let bboxes = self
                    .rows(image)
                    .map(|row| {
                        let CsvSample { cx, cy, w, h, .. } = *row;
                        BBox::try_from_relative_xcycwh(cx, cy, w, h, width, height)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(bboxes)
            }),
        ]
    }

    fn describe(&self, &index: &Self::Sample) -> String {
        match self.images.get_index(index) {
            Some((image_file, _)) => format!("'{}'", image_file),
            None => format!("image #{}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdMap, Parsed, RecordParser};

    /// The smallest PNG header `imagesize` understands.
    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes.extend_from_slice(&[0; 4]);
        bytes
    }

    #[test]
    fn csv_parser() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("images");
        fs::create_dir(&image_dir).unwrap();
        fs::write(image_dir.join("a.png"), png_header(640, 480)).unwrap();
        fs::write(image_dir.join("b.png"), png_header(100, 100)).unwrap();

        let label_file = dir.path().join("label.csv");
        fs::write(
            &label_file,
            "image_file,class_name,cx,cy,w,h\n\
             # the first image\n\
             a.png,person,0.7,0.2,0.1,0.2\n\
             b.png,dog,0.5,0.5,0.2,0.2\n\
             missing.png,person,0.5,0.5,0.1,0.1\n\
             a.png,dog,0.5,0.5,0.5,0.5\n",
        )
        .unwrap();

        let classes = ClassMap::new(
            ["person", "dog"].into_iter().map(String::from).collect(),
            None,
        )
        .unwrap();
        let parser = RecordParser::new(CsvParser::load(&label_file, &image_dir, classes).unwrap()).unwrap();

        let mut id_map = IdMap::new();
        let Parsed { records, skipped } = parser.parse_dicted(&mut id_map).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].sample, "'missing.png'");
        assert_eq!(id_map.key(0).map(String::as_str), Some("a.png"));

        let record = &records[&0];
        assert_eq!(record.size(), Some(ImageSize::try_from_wh([640, 480]).unwrap()));
        assert_eq!(record.labels(), Some(&[1, 2][..]));
        assert_eq!(
            record.bboxes().unwrap(),
            &[
                BBox::from_xyxy(416.0, 48.0, 480.0, 144.0),
                BBox::from_xyxy(160.0, 120.0, 480.0, 360.0)
            ]
        );
        assert_eq!(record.filepath(), Some(image_dir.join("a.png").as_path()));
    }

    #[test]
    fn csv_parser_skips_non_finite_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.png"), png_header(640, 480)).unwrap();
        fs::write(dir.path().join("b.png"), png_header(640, 480)).unwrap();

        let rows = vec![
            CsvSample {
                image_file: "a.png".into(),
                class_name: "person".into(),
                cx: f64::NAN,
                cy: 0.5,
                w: 0.1,
                h: 0.1,
            },
            CsvSample {
                image_file: "b.png".into(),
                class_name: "person".into(),
                cx: 1e308,
                cy: 0.5,
                w: 0.1,
                h: 0.1,
            },
            CsvSample {
                image_file: "b.png".into(),
                class_name: "person".into(),
                cx: 0.5,
                cy: 0.5,
                w: 0.1,
                h: 0.1,
            },
        ];
        let classes = ClassMap::new(["person".to_owned()].into_iter().collect(), None).unwrap();
        let parser = RecordParser::new(CsvParser::new(rows, dir.path(), classes)).unwrap();

        let Parsed { records, skipped } = parser.parse_dicted(&mut IdMap::new()).unwrap();
        assert!(records.is_empty());
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].key.as_deref(), Some("a.png"));
        assert_eq!(skipped[1].key.as_deref(), Some("b.png"));
    }

    #[test]
    fn csv_parser_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let label_file = dir.path().join("label.csv");
        fs::write(&label_file, "image_file,class_name,cx,cy,w,h\na.png,person,x,0,0,0\n").unwrap();

        let classes = ClassMap::new(["person".to_owned()].into_iter().collect(), None).unwrap();
        assert!(CsvParser::load(&label_file, dir.path(), classes).is_err());
    }
}
