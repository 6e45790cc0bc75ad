use crate::{
    common::*,
    mixin,
    utils::{file_stem, list_files},
    ClassMap, Extract, ImageSize, Mask, Mixin, Parser,
};

/// The annotation file of a PASCAL VOC image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VocAnnotation {
    pub filename: String,
    pub size: VocSize,
    #[serde(rename = "object", default)]
    pub objects: Vec<VocObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VocSize {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VocObject {
    pub name: String,
    pub bndbox: VocBndBox,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VocBndBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl VocBndBox {
    /// The box with coordinates truncated to integer pixels. Fails on NaN
    /// or infinite coordinates.
    pub fn to_bbox(&self) -> Result<BBox> {
        let Self {
            xmin,
            ymin,
            xmax,
            ymax,
        } = *self;
        BBox::try_new(xmin.trunc(), ymin.trunc(), xmax.trunc(), ymax.trunc())
    }
}

/// A parsed annotation file.
#[derive(Debug, Clone)]
pub struct VocSample {
    pub key: String,
    pub annotation: VocAnnotation,
}

/// Parses the boxes of PASCAL VOC XML annotation files.
///
/// The native key of an image is the stem of its file name.
#[derive(Debug, Clone)]
pub struct VocXmlParser {
    annotations_dir: PathBuf,
    images_dir: PathBuf,
    classes: ClassMap,
}

impl VocXmlParser {
    pub fn new(
        annotations_dir: impl AsRef<Path>,
        images_dir: impl AsRef<Path>,
        classes: ClassMap,
    ) -> Self {
        Self {
            annotations_dir: annotations_dir.as_ref().to_owned(),
            images_dir: images_dir.as_ref().to_owned(),
            classes,
        }
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    fn objects<'a>(&'a self, sample: &'a VocSample) -> impl Iterator<Item = &'a VocObject> {
        sample
            .annotation
            .objects
            .iter()
            .filter(move |object| self.classes.is_whitelisted(&object.name))
    }
}

impl Parser for VocXmlParser {
    type Key = String;
    type Sample = PathBuf;
    type Prepared = VocSample;

    fn samples(&self) -> Result<Box<dyn Iterator<Item = Self::Sample> + '_>> {
        let files = list_files(&self.annotations_dir, &["xml"])?;
        Ok(Box::new(files.into_iter()))
    }

    fn prepare(&self, annotation_file: &Self::Sample) -> Extract<Self::Prepared> {
        let xml_content = fs::read_to_string(annotation_file).with_context(|| {
            format!(
                "failed to read annotation file '{}'",
                annotation_file.display()
            )
        })?;
        let annotation: VocAnnotation =
            serde_xml_rs::from_str(&xml_content).with_context(|| {
                format!(
                    "failed to parse annotation file '{}'",
                    annotation_file.display()
                )
            })?;
        let key = file_stem(Path::new(&annotation.filename))?;
        Ok(VocSample { key, annotation })
    }

    fn image_id(&self, sample: &Self::Prepared) -> Self::Key {
        sample.key.clone()
    }

    fn mixins(&self) -> Vec<Box<dyn Mixin<Self::Prepared> + '_>> {
        vec![
            mixin::filepath(move |sample: &VocSample| {
                Ok(self.images_dir.join(&sample.annotation.filename))
            }),
            mixin::size(|sample: &VocSample| {
                let VocSize { width, height, .. } = sample.annotation.size;
                Ok(ImageSize::try_from_wh([width, height])?)
            }),
            mixin::labels(move |sample: &VocSample| {
                let mut labels = vec![];
                for object in self.objects(sample) {
                    labels.extend(self.classes.resolve(&object.name)?);
                }
                Ok(labels)
            }),
            mixin::bboxes(move |sample: &VocSample| {
                let bboxes = self
                    .objects(sample)
                    .map(|object| {
                        object.bndbox.to_bbox().with_context(|| {
                            format!("invalid box of object '{}'", object.name)
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(bboxes)
            }),
        ]
    }

    fn describe(&self, annotation_file: &Self::Sample) -> String {
        format!("'{}'", annotation_file.display())
    }
}

/// Parses PASCAL VOC instance segmentation images.
///
/// Each mask image covers all objects of the image whose file stem it shares.
#[derive(Debug, Clone)]
pub struct VocMaskParser {
    masks_dir: PathBuf,
}

/// A mask image with its native key.
#[derive(Debug, Clone)]
pub struct MaskFile {
    pub key: String,
    pub path: PathBuf,
}

impl VocMaskParser {
    pub const EXTENSIONS: &'static [&'static str] = &["png", "jpg", "jpeg", "bmp"];

    pub fn new(masks_dir: impl AsRef<Path>) -> Self {
        Self {
            masks_dir: masks_dir.as_ref().to_owned(),
        }
    }
}

impl Parser for VocMaskParser {
    type Key = String;
    type Sample = PathBuf;
    type Prepared = MaskFile;

    fn samples(&self) -> Result<Box<dyn Iterator<Item = Self::Sample> + '_>> {
        let files = list_files(&self.masks_dir, Self::EXTENSIONS)?;
        Ok(Box::new(files.into_iter()))
    }

    fn prepare(&self, path: &Self::Sample) -> Extract<Self::Prepared> {
        Ok(MaskFile {
            key: file_stem(path)?,
            path: path.clone(),
        })
    }

    fn image_id(&self, mask_file: &Self::Prepared) -> Self::Key {
        mask_file.key.clone()
    }

    fn mixins(&self) -> Vec<Box<dyn Mixin<Self::Prepared> + '_>> {
        vec![mixin::masks(|mask_file: &MaskFile| {
            Ok(vec![Mask::File(mask_file.path.clone())])
        })]
    }

    fn describe(&self, path: &Self::Sample) -> String {
        format!("'{}'", path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, IdMap, Parsed, RecordParser};

    const ANNOTATION: &str = r#"<annotation>
    <folder>VOC2012</folder>
    <filename>2007_000032.jpg</filename>
    <size>
        <width>500</width>
        <height>281</height>
        <depth>3</depth>
    </size>
    <segmented>1</segmented>
    <object>
        <name>aeroplane</name>
        <pose>Frontal</pose>
        <truncated>0</truncated>
        <difficult>0</difficult>
        <bndbox>
            <xmin>104.7</xmin>
            <ymin>78</ymin>
            <xmax>375</xmax>
            <ymax>183.9</ymax>
        </bndbox>
    </object>
    <object>
        <name>person</name>
        <bndbox>
            <xmin>195</xmin>
            <ymin>180</ymin>
            <xmax>213</xmax>
            <ymax>229</ymax>
        </bndbox>
    </object>
</annotation>
"#;

    fn classes(whitelist: Option<&[&str]>) -> ClassMap {
        let classes = ["aeroplane", "bicycle", "person"]
            .into_iter()
            .map(String::from)
            .collect();
        let whitelist = whitelist.map(|names| names.iter().map(|&name| name.to_owned()).collect());
        ClassMap::new(classes, whitelist).unwrap()
    }

    #[test]
    fn voc_annotation_deserialize() {
        let annotation: VocAnnotation = serde_xml_rs::from_str(ANNOTATION).unwrap();
        assert_eq!(annotation.filename, "2007_000032.jpg");
        assert_eq!(annotation.size.width, 500);
        assert_eq!(annotation.size.depth, Some(3));
        assert_eq!(annotation.objects.len(), 2);
        assert_eq!(
            annotation.objects[0].bndbox.to_bbox().unwrap(),
            BBox::from_xyxy(104.0, 78.0, 375.0, 183.0)
        );
    }

    #[test]
    fn voc_xml_parser() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2007_000032.xml"), ANNOTATION).unwrap();
        fs::write(dir.path().join("broken.xml"), "<annotation>").unwrap();

        let parser = RecordParser::new(VocXmlParser::new(dir.path(), "images", classes(None))).unwrap();
        assert!(parser.schema().contains(Field::Filepath));

        let mut id_map = IdMap::new();
        let Parsed { records, skipped } = parser.parse_dicted(&mut id_map).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].sample.contains("broken.xml"));
        assert_eq!(id_map.key(0).map(String::as_str), Some("2007_000032"));

        let record = &records[&0];
        assert_eq!(record.labels(), Some(&[1, 3][..]));
        assert_eq!(record.bboxes().unwrap().len(), 2);
        assert_eq!(record.size().unwrap().w(), 500);
        assert_eq!(
            record.filepath(),
            Some(Path::new("images/2007_000032.jpg"))
        );
    }

    #[test]
    fn voc_xml_parser_whitelist_and_unknown_classes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.xml"), ANNOTATION).unwrap();

        let parser = RecordParser::new(VocXmlParser::new(
            dir.path(),
            "images",
            classes(Some(&["person"])),
        ))
        .unwrap();
        let Parsed { records, .. } = parser.parse_dicted(&mut IdMap::new()).unwrap();
        let record = &records[&0];
        assert_eq!(record.labels(), Some(&[3][..]));
        assert_eq!(
            record.bboxes().unwrap(),
            &[BBox::from_xyxy(195.0, 180.0, 213.0, 229.0)]
        );

        let unknown = ClassMap::new(["person".to_owned()].into_iter().collect(), None).unwrap();
        let parser = RecordParser::new(VocXmlParser::new(dir.path(), "images", unknown)).unwrap();
        let Parsed { records, skipped } = parser.parse_dicted(&mut IdMap::new()).unwrap();
        assert!(records.is_empty());
        assert_eq!(skipped[0].key.as_deref(), Some("2007_000032"));
    }

    #[test]
    fn voc_xml_parser_skips_non_finite_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let nan_annotation = ANNOTATION
            .replacen("<xmin>195</xmin>", "<xmin>nan</xmin>", 1)
            .replace("2007_000032.jpg", "2007_000001.jpg");
        assert!(nan_annotation.contains("<xmin>nan</xmin>"));
        fs::write(dir.path().join("2007_000001.xml"), nan_annotation).unwrap();
        fs::write(dir.path().join("2007_000032.xml"), ANNOTATION).unwrap();

        let parser = RecordParser::new(VocXmlParser::new(dir.path(), "images", classes(None))).unwrap();
        let mut id_map = IdMap::new();
        let Parsed { records, skipped } = parser.parse_dicted(&mut id_map).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].key.as_deref(), Some("2007_000001"));
        assert!(skipped[0].reason.reason().contains("not finite"));
        assert_eq!(id_map.len(), 1);
        assert_eq!(id_map.key(0).map(String::as_str), Some("2007_000032"));
    }

    #[test]
    fn voc_mask_parser() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2007_000033.png", "2007_000032.png", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let parser = RecordParser::new(VocMaskParser::new(dir.path())).unwrap();
        let mut id_map = IdMap::new();
        let Parsed { records, .. } = parser.parse_dicted(&mut id_map).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(id_map.key(0).map(String::as_str), Some("2007_000032"));
        assert_eq!(
            records[&1].masks(),
            Some(&[Mask::File(dir.path().join("2007_000033.png"))][..])
        );
    }
}
